mod udp;

pub use udp::{SocketOptions, bind_udp};
