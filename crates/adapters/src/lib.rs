pub mod ebpf;
pub mod net;
pub mod storage;
