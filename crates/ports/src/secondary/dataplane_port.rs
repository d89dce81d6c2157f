use domain::common::error::CoreError;
use ebpf_common::forwarding::{ForwardingKey, ForwardingValue};

/// Secondary port for the kernel forwarding data plane.
///
/// One hash map exists per attached ingress interface; keys and values are
/// the `#[repr(C)]` records defined in `ebpf_common::forwarding`, so the
/// ABI crosses this boundary untouched.
///
/// The reconciler is the only caller that issues writes. All operations are
/// idempotent where the spec requires it: attaching an attached interface or
/// detaching a detached one is a no-op.
///
/// Implemented by `XdpDataplane` in the adapter layer and `MockDataplane`
/// in `test_utils`.
pub trait DataplanePort: Send {
    /// Resolve an OS interface name to its ifindex.
    fn resolve_ifindex(&self, name: &str) -> Result<u32, CoreError>;

    /// Attach the data-plane program to an interface, enable promiscuous
    /// mode, and make sure its forwarding map exists. Returns the ifindex.
    fn attach(&mut self, name: &str) -> Result<u32, CoreError>;

    /// Detach the program, remove the interface's map, and disable
    /// promiscuous mode.
    fn detach(&mut self, ifindex: u32) -> Result<(), CoreError>;

    /// Interfaces the data plane is currently attached to.
    fn attached(&self) -> Vec<u32>;

    /// Open (or create) the forwarding map for an attached interface.
    fn ensure_map(&mut self, ifindex: u32) -> Result<(), CoreError>;

    fn map_put(
        &mut self,
        ifindex: u32,
        key: ForwardingKey,
        value: ForwardingValue,
    ) -> Result<(), CoreError>;

    fn map_delete(&mut self, ifindex: u32, key: ForwardingKey) -> Result<(), CoreError>;

    fn map_clear(&mut self, ifindex: u32) -> Result<(), CoreError>;

    /// Current contents of an interface's map.
    fn map_entries(
        &self,
        ifindex: u32,
    ) -> Result<Vec<(ForwardingKey, ForwardingValue)>, CoreError>;
}
