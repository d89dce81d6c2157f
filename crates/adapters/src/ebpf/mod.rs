mod dataplane;
mod iface;

pub use dataplane::XdpDataplane;
