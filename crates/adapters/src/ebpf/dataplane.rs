//! aya-backed implementation of the forwarding data plane.
//!
//! Each attached ingress interface gets its own program instance and hash
//! map, loaded from the configured XDP object file and pinned as
//! `fw_table_<iface>` under the bpffs root. Per-interface maps keep one
//! broken interface from poisoning the rest and let the reconciler detach
//! purely from map emptiness.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use aya::Ebpf;
use aya::maps::{HashMap as BpfHashMap, MapData};
use aya::programs::{Xdp, XdpFlags};
use domain::common::error::CoreError;
use ebpf_common::forwarding::{ForwardingKey, ForwardingValue};
use ports::secondary::dataplane_port::DataplanePort;
use tracing::{debug, info, warn};

use super::iface;

/// Program symbol in the data-plane object file.
const PROGRAM_NAME: &str = "xdp_program";

/// Map symbol in the data-plane object file.
const MAP_NAME: &str = "fw_table";

struct IfaceHandle {
    name: String,
    /// Owns the loaded program; dropping it detaches the XDP hook.
    _ebpf: Ebpf,
    map: BpfHashMap<MapData, ForwardingKey, ForwardingValue>,
    pin_path: PathBuf,
}

pub struct XdpDataplane {
    object: Vec<u8>,
    pin_dir: PathBuf,
    ifaces: HashMap<u32, IfaceHandle>,
}

impl XdpDataplane {
    /// Read the data-plane object file and prepare the pin directory.
    ///
    /// Pins left behind by a previous process are removed: XDP links die
    /// with their owning process, so a leftover `fw_table_*` pin holds map
    /// contents no program is serving anymore.
    pub fn new(object_path: &Path, pin_dir: &Path) -> Result<Self, CoreError> {
        let object = fs::read(object_path).map_err(|e| {
            CoreError::Kernel {
                op: "read_object".to_string(),
                detail: format!("{}: {e}", object_path.display()),
            }
        })?;

        fs::create_dir_all(pin_dir).map_err(|e| CoreError::Kernel {
            op: "create_pin_dir".to_string(),
            detail: format!("{}: {e}", pin_dir.display()),
        })?;

        let dataplane = Self {
            object,
            pin_dir: pin_dir.to_path_buf(),
            ifaces: HashMap::new(),
        };
        dataplane.remove_stale_pins();
        Ok(dataplane)
    }

    fn remove_stale_pins(&self) {
        let Ok(entries) = fs::read_dir(&self.pin_dir) else {
            return;
        };
        for entry in entries.filter_map(Result::ok) {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with("fw_table_") {
                debug!(pin = %entry.path().display(), "removing stale map pin");
                if let Err(e) = fs::remove_file(entry.path()) {
                    warn!(pin = %entry.path().display(), error = %e, "failed to remove stale pin");
                }
            }
        }
    }

    fn map_pin_path(&self, name: &str) -> PathBuf {
        self.pin_dir.join(format!("fw_table_{name}"))
    }

    fn handle(&self, ifindex: u32) -> Result<&IfaceHandle, CoreError> {
        self.ifaces.get(&ifindex).ok_or_else(|| CoreError::Kernel {
            op: "map_open".to_string(),
            detail: format!("no map for ifindex {ifindex} (interface not attached)"),
        })
    }

    fn handle_mut(&mut self, ifindex: u32) -> Result<&mut IfaceHandle, CoreError> {
        self.ifaces.get_mut(&ifindex).ok_or_else(|| CoreError::Kernel {
            op: "map_open".to_string(),
            detail: format!("no map for ifindex {ifindex} (interface not attached)"),
        })
    }

    fn kernel(op: &str, e: impl std::fmt::Display) -> CoreError {
        CoreError::Kernel {
            op: op.to_string(),
            detail: e.to_string(),
        }
    }
}

impl DataplanePort for XdpDataplane {
    fn resolve_ifindex(&self, name: &str) -> Result<u32, CoreError> {
        iface::resolve_ifindex(name)
    }

    fn attach(&mut self, name: &str) -> Result<u32, CoreError> {
        let ifindex = iface::resolve_ifindex(name)?;
        if self.ifaces.contains_key(&ifindex) {
            return Ok(ifindex);
        }
        iface::ensure_privileged("attach")?;

        let mut ebpf = Ebpf::load(&self.object).map_err(|e| Self::kernel("prog_load", e))?;

        // Best-effort: the object may carry no log statements at all.
        if let Err(e) = aya_log::EbpfLogger::init(&mut ebpf) {
            debug!(interface = name, "eBPF logger init skipped: {e}");
        }

        let program: &mut Xdp = ebpf
            .program_mut(PROGRAM_NAME)
            .ok_or_else(|| Self::kernel("prog_load", format!("program '{PROGRAM_NAME}' not found in object")))?
            .try_into()
            .map_err(|e| Self::kernel("prog_load", e))?;
        program.load().map_err(|e| Self::kernel("prog_load", e))?;

        // Native mode first, generic as fallback for drivers without XDP.
        program
            .attach(name, XdpFlags::default())
            .or_else(|_| program.attach(name, XdpFlags::SKB_MODE))
            .map_err(|e| Self::kernel("xdp_attach", e))?;

        let map = ebpf
            .take_map(MAP_NAME)
            .ok_or_else(|| Self::kernel("map_open", format!("map '{MAP_NAME}' not found in object")))?;

        let pin_path = self.map_pin_path(name);
        let _ = fs::remove_file(&pin_path);
        if let Err(e) = map.pin(&pin_path) {
            warn!(interface = name, error = %e, "map pinning failed (continuing unpinned)");
        }

        let map = BpfHashMap::try_from(map).map_err(|e| Self::kernel("map_open", e))?;

        iface::set_promiscuous(name, true);
        info!(interface = name, ifindex, "data plane attached");

        self.ifaces.insert(
            ifindex,
            IfaceHandle {
                name: name.to_string(),
                _ebpf: ebpf,
                map,
                pin_path,
            },
        );
        Ok(ifindex)
    }

    fn detach(&mut self, ifindex: u32) -> Result<(), CoreError> {
        let Some(handle) = self.ifaces.remove(&ifindex) else {
            return Ok(());
        };
        iface::ensure_privileged("detach")?;

        if let Err(e) = fs::remove_file(&handle.pin_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(pin = %handle.pin_path.display(), error = %e, "failed to remove map pin");
            }
        }
        iface::set_promiscuous(&handle.name, false);
        info!(interface = %handle.name, ifindex, "data plane detached");
        // Dropping the handle unloads the program and detaches the hook.
        Ok(())
    }

    fn attached(&self) -> Vec<u32> {
        let mut ifindexes: Vec<u32> = self.ifaces.keys().copied().collect();
        ifindexes.sort_unstable();
        ifindexes
    }

    fn ensure_map(&mut self, ifindex: u32) -> Result<(), CoreError> {
        self.handle(ifindex).map(|_| ())
    }

    fn map_put(
        &mut self,
        ifindex: u32,
        key: ForwardingKey,
        value: ForwardingValue,
    ) -> Result<(), CoreError> {
        self.handle_mut(ifindex)?
            .map
            .insert(key, value, 0)
            .map_err(|e| Self::kernel("map_update", e))
    }

    fn map_delete(&mut self, ifindex: u32, key: ForwardingKey) -> Result<(), CoreError> {
        self.handle_mut(ifindex)?
            .map
            .remove(&key)
            .map_err(|e| Self::kernel("map_delete", e))
    }

    fn map_clear(&mut self, ifindex: u32) -> Result<(), CoreError> {
        let handle = self.handle_mut(ifindex)?;
        let keys: Vec<ForwardingKey> = handle.map.keys().filter_map(Result::ok).collect();
        for key in &keys {
            handle
                .map
                .remove(key)
                .map_err(|e| Self::kernel("map_delete", e))?;
        }
        Ok(())
    }

    fn map_entries(
        &self,
        ifindex: u32,
    ) -> Result<Vec<(ForwardingKey, ForwardingValue)>, CoreError> {
        let handle = self.handle(ifindex)?;
        Ok(handle.map.iter().filter_map(Result::ok).collect())
    }
}
