//! Control plane: the bus registry, the probe pipeline that (re)populates a
//! bus's device list, and the request dispatcher a host PnP manager drives.
//! Grounded on `isapnp.c`'s `ProbeIsaPnpBus`, `IsaPnpFillDeviceRelations`,
//! and `pdo.c`'s `IsaPdoPnp` minor-function switch.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use lazy_static::lazy_static;

use crate::error::{IsaPnpError, Result};
use crate::ids;
use crate::isolation;
use crate::model::LogicalDevice;
use crate::parser;
use crate::ports::{IsaBus, READ_PORT_CANDIDATES};
use crate::requirements::{self, RequirementDescriptor, RequirementsList};
use crate::resource_list;
use crate::sync::{BusListLock, DeviceListLock};

lazy_static! {
    /// Every enumerated bus, in insertion order. Read Data Port ownership
    /// handoff on removal looks at whichever bus is first here.
    static ref BUSES: BusListLock<Vec<Arc<Bus>>> = BusListLock::new(Vec::new());
}

/// Register a newly started bus and return a handle to it.
pub fn add_bus(bus_number: u32) -> Arc<Bus> {
    let bus = Arc::new(Bus::new(bus_number));
    BUSES.lock().push(bus.clone());
    bus
}

/// Remove `bus` from the registry. If it owned the Read Data Port, the
/// first remaining bus inherits the obligation to claim one on its next
/// `QueryRelations`, matching `IsaFdoRemoveDevice`'s handoff to whichever
/// bus is first in the global list once this one is gone.
pub fn remove_bus(bus: &Arc<Bus>) -> Option<Arc<Bus>> {
    let mut buses = BUSES.lock();
    let owned_read_port = bus.read_data_port().is_some();
    buses.retain(|b| !Arc::ptr_eq(b, bus));

    if owned_read_port {
        if let Some(next) = buses.first() {
            *next.needs_rebalance.lock() = true;
            return Some(next.clone());
        }
    }
    None
}

/// Upper bound on a card's resource-data tag stream, matching the fixed
/// scratch allocation the original probe uses.
pub const MAX_RESOURCE_DATA: usize = 0x1000;

/// One enumerated ISA bus. Owns its logical-device list and, if it won the
/// bus-wide handoff, the shared Read Data Port.
pub struct Bus {
    pub bus_number: u32,
    devices: DeviceListLock<Vec<LogicalDevice>>,
    read_port: DeviceListLock<Option<u16>>,
    needs_rebalance: DeviceListLock<bool>,
}

impl Bus {
    pub fn new(bus_number: u32) -> Self {
        Bus {
            bus_number,
            devices: DeviceListLock::new(Vec::new()),
            read_port: DeviceListLock::new(None),
            needs_rebalance: DeviceListLock::new(false),
        }
    }

    pub fn read_data_port(&self) -> Option<u16> {
        *self.read_port.lock()
    }

    pub fn device_count(&self) -> usize {
        self.devices.lock().iter().filter(|d| d.present).count()
    }
}

/// Try each candidate port in turn (the host pins one via a prior resource
/// assignment; absent that, try all of them) until isolation succeeds
/// without reporting a conflict. Returns the card count isolated on the
/// port that succeeded.
pub fn start_read_port(bus: &Bus, isa: &mut dyn IsaBus, preferred: Option<u16>) -> Result<u8> {
    let candidates: Vec<u16> = match preferred {
        Some(port) => alloc::vec![port],
        None => READ_PORT_CANDIDATES.to_vec(),
    };

    for port in candidates {
        isa.set_read_data_port(port);
        isolation::set_read_data_port(isa, port);
        if let Ok(count) = isolation::try_isolate(isa) {
            *bus.read_port.lock() = Some(port);
            return Ok(count);
        }
    }
    // Matches the original's "mark read data port as started, even if no
    // card detected" -- every candidate conflicted, report no cards rather
    // than propagate the last candidate's error.
    Ok(0)
}

/// Re-run isolation and tag parsing for every card on the bus, merging
/// results into the existing device list (matching by serial number,
/// vendor id, product id and LDN) and deactivating every probed logical
/// device once its state has been captured.
pub fn probe_bus(bus: &Bus, isa: &mut dyn IsaBus) -> Result<()> {
    let port = bus.read_data_port().ok_or(IsaPnpError::DeviceAbsent)?;
    isa.set_read_data_port(port);

    let mut devices = bus.devices.lock();
    for device in devices.iter_mut() {
        device.present = false;
    }

    let card_count = isolation::try_isolate(isa)?;
    log::debug!("isapnp: bus {} isolated {} card(s)", bus.bus_number, card_count);

    for csn in 1..=card_count {
        isolation::wake_and_select(isa, csn, 0);

        let mut identifier = [0u8; 9];
        isolation::peek(isa, &mut identifier);
        let card_vendor = ids::expand_vendor_id(u16::from_be_bytes([identifier[0], identifier[1]]));
        let card_prod_id = u16::from_be_bytes([identifier[2], identifier[3]]);
        let serial_number = u32::from_be_bytes([identifier[4], identifier[5], identifier[6], identifier[7]]);

        let mut tag_buffer = alloc::vec![0u8; MAX_RESOURCE_DATA];
        isolation::peek(isa, &mut tag_buffer);
        // A tag-read overflow or invalid tag only aborts this card; cards
        // already merged into `devices` stay as they are.
        let parsed = match parser::parse_card(&tag_buffer, csn, card_vendor, card_prod_id, serial_number) {
            Ok(parsed) => parsed,
            Err(err) => {
                log::error!("isapnp: failed to parse resource data for csn {}: {}", csn, err);
                continue;
            }
        };

        for mut fresh in parsed {
            let ldn = fresh.ldn;
            let existing = devices.iter_mut().find(|d| {
                d.serial_number == fresh.serial_number
                    && d.card_vendor == fresh.card_vendor
                    && d.card_prod_id == fresh.card_prod_id
                    && d.ldn == ldn
            });

            match existing {
                Some(device) => {
                    device.present = true;
                    device.csn = csn;
                }
                None => {
                    fresh.csn = csn;
                    resource_list_read_current(isa, &mut fresh, csn);
                    fresh.present = true;
                    devices.push(fresh);
                }
            }

            // Every probed logical device ends deactivated, whether newly
            // created or already known -- resource assignment happens later,
            // driven by the host.
            isolation::set_device_activation(isa, csn, ldn, false);
        }
    }

    Ok(())
}

fn resource_list_read_current(isa: &mut dyn IsaBus, device: &mut LogicalDevice, csn: u8) {
    crate::resources::read_current_resources(isa, device, csn);
}

/// Minor-function requests a host PnP manager drives against a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Start,
    Stop,
    QueryRelations,
    QueryCapabilities,
    QueryResources,
    QueryResourceRequirements,
    QueryId,
    QueryDeviceText,
    QueryPnpState,
    UsageNotification,
    Remove,
}

/// ACPI-style system sleep state, coarse enough for this core's power
/// mapping (the host owns the real power-management pipeline).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemPowerState {
    Working,
    Sleeping1,
    Sleeping2,
    Sleeping3,
    Shutdown,
}

/// Device power state a logical device is asked to enter for a given
/// system sleep state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevicePowerState {
    D0,
    D3,
}

/// Every ISA PnP logical device maps the working system state to D0 (fully
/// on) and every sleep/shutdown state to D3 (off) -- there is no
/// intermediate D1/D2 support at this bus level. Mirrors
/// `IsaFdoCreateRequirements`'s capabilities response in `isapnp.c`.
pub fn device_power_state(system: SystemPowerState) -> DevicePowerState {
    match system {
        SystemPowerState::Working => DevicePowerState::D0,
        _ => DevicePowerState::D3,
    }
}

const ALL_SYSTEM_POWER_STATES: [SystemPowerState; 5] = [
    SystemPowerState::Working,
    SystemPowerState::Sleeping1,
    SystemPowerState::Sleeping2,
    SystemPowerState::Sleeping3,
    SystemPowerState::Shutdown,
];

fn power_state_table() -> Vec<(SystemPowerState, DevicePowerState)> {
    ALL_SYSTEM_POWER_STATES.iter().map(|&system| (system, device_power_state(system))).collect()
}

#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    pub unique_id: bool,
    pub raw_device_ok: bool,
    pub silent_install: bool,
    /// Device power state for every system power state, filled in from
    /// [`device_power_state`] for every `QueryCapabilities` response.
    pub power_states: Vec<(SystemPowerState, DevicePowerState)>,
}

#[derive(Debug, Clone, Default)]
pub struct DeviceIds {
    pub device_id: String,
    pub hardware_ids: Vec<String>,
    pub compatible_ids: Vec<String>,
    pub instance_id: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PnpStateFlags {
    pub not_disableable: bool,
    /// Only meaningful on the Read Port device: the Read Port moved to a
    /// different owning bus and its resource requirements should be
    /// re-queried.
    pub needs_rebalance: bool,
}

pub enum Response {
    Started,
    Stopped,
    Relations(Vec<(u8, u8)>),
    Capabilities(Capabilities),
    Resources(Vec<RequirementDescriptor>),
    ResourceRequirements(RequirementsList),
    Ids(DeviceIds),
    DeviceText(String),
    PnpState(PnpStateFlags),
    /// The Read Port pinned to a successful candidate for the first time;
    /// the host must re-arbitrate against the narrowed requirements list
    /// and start again.
    RequirementsChanged,
    Removed,
}

/// Dispatch a minor-function request against one logical device. Requests
/// the core does not own (read/write-config, eject, set-lock,
/// query-bus-information, device-usage-notification) return
/// [`IsaPnpError::HostRelayed`] so the host can forward them unchanged.
pub fn dispatch_device(
    bus: &Bus,
    isa: &mut dyn IsaBus,
    csn: u8,
    ldn: u8,
    request: Request,
) -> Result<Response> {
    match request {
        Request::Start => {
            let mut devices = bus.devices.lock();
            let device = find_device_mut(&mut devices, csn, ldn)?;
            isolation::set_device_activation(isa, csn, ldn, true);
            device.current.activated = true;
            log::debug!("isapnp: started csn {} ldn {}", csn, ldn);
            Ok(Response::Started)
        }
        Request::Stop => {
            isolation::set_device_activation(isa, csn, ldn, false);
            let mut devices = bus.devices.lock();
            let device = find_device_mut(&mut devices, csn, ldn)?;
            device.current.activated = false;
            log::debug!("isapnp: stopped csn {} ldn {}", csn, ldn);
            Ok(Response::Stopped)
        }
        Request::QueryCapabilities => Ok(Response::Capabilities(Capabilities {
            unique_id: true,
            raw_device_ok: false,
            silent_install: false,
            power_states: power_state_table(),
        })),
        Request::QueryResources => {
            let devices = bus.devices.lock();
            let device = find_device(&devices, csn, ldn)?;
            Ok(Response::Resources(resource_list::current_resource_list(device)))
        }
        Request::QueryResourceRequirements => {
            let devices = bus.devices.lock();
            let device = find_device(&devices, csn, ldn)?;
            Ok(Response::ResourceRequirements(requirements::build_requirements(device)))
        }
        Request::QueryId => {
            let devices = bus.devices.lock();
            let device = find_device(&devices, csn, ldn)?;
            Ok(Response::Ids(device_ids(device)))
        }
        Request::QueryDeviceText => {
            let devices = bus.devices.lock();
            let device = find_device(&devices, csn, ldn)?;
            Ok(Response::DeviceText(device.friendly_name.clone().unwrap_or_default()))
        }
        Request::QueryPnpState => Ok(Response::PnpState(PnpStateFlags {
            not_disableable: true,
            needs_rebalance: false,
        })),
        Request::QueryRelations => Ok(Response::Relations(Vec::new())),
        Request::UsageNotification => Err(IsaPnpError::HostRelayed),
        Request::Remove => {
            let mut devices = bus.devices.lock();
            devices.retain(|d| !(d.csn == csn && d.ldn == ldn));
            Ok(Response::Removed)
        }
    }
}

/// Dispatch against the bus's synthetic Read Data Port device. `arbitrated_port`
/// is only consulted for [`Request::Start`]: `None` means the host has not
/// narrowed the published candidate list yet, `Some(port)` means it arbitrated
/// one concrete window.
pub fn dispatch_read_port(
    bus: &Bus,
    isa: &mut dyn IsaBus,
    request: Request,
    arbitrated_port: Option<u16>,
) -> Result<Response> {
    match request {
        Request::Start => {
            if bus.read_data_port().is_some() {
                // Already pinned from a prior Start: re-confirm the port and
                // run a full probe, which refreshes the device list and
                // leaves stale devices unmarked `present`.
                probe_bus(bus, isa)?;
                log::debug!("isapnp: bus {} re-probed on pinned read port", bus.bus_number);
                return Ok(Response::Started);
            }

            let count = start_read_port(bus, isa, arbitrated_port)?;
            if count > 0 {
                *bus.needs_rebalance.lock() = true;
                log::debug!(
                    "isapnp: bus {} pinned read port with {} card(s), requirements changed",
                    bus.bus_number,
                    count
                );
                Ok(Response::RequirementsChanged)
            } else {
                log::debug!("isapnp: bus {} read port started with no cards", bus.bus_number);
                Ok(Response::Started)
            }
        }
        Request::QueryCapabilities => Ok(Response::Capabilities(Capabilities {
            unique_id: true,
            raw_device_ok: true,
            silent_install: true,
            power_states: power_state_table(),
        })),
        Request::QueryPnpState => Ok(Response::PnpState(PnpStateFlags {
            not_disableable: true,
            needs_rebalance: *bus.needs_rebalance.lock(),
        })),
        Request::QueryId => Ok(Response::Ids(DeviceIds {
            device_id: String::from(ids::READ_PORT_DEVICE_ID),
            hardware_ids: alloc::vec![String::from(ids::READ_PORT_DEVICE_ID)],
            compatible_ids: Vec::new(),
            instance_id: String::from(ids::READ_PORT_INSTANCE_ID),
        })),
        Request::QueryRelations => {
            let devices = bus.devices.lock();
            Ok(Response::Relations(devices.iter().filter(|d| d.present).map(|d| (d.csn, d.ldn)).collect()))
        }
        Request::Stop | Request::Remove | Request::QueryResources | Request::QueryResourceRequirements
        | Request::QueryDeviceText | Request::UsageNotification => Err(IsaPnpError::HostRelayed),
    }
}

fn find_device<'a>(devices: &'a [LogicalDevice], csn: u8, ldn: u8) -> Result<&'a LogicalDevice> {
    devices.iter().find(|d| d.csn == csn && d.ldn == ldn).ok_or(IsaPnpError::DeviceAbsent)
}

fn find_device_mut<'a>(devices: &'a mut [LogicalDevice], csn: u8, ldn: u8) -> Result<&'a mut LogicalDevice> {
    devices.iter_mut().find(|d| d.csn == csn && d.ldn == ldn).ok_or(IsaPnpError::DeviceAbsent)
}

fn device_ids(device: &LogicalDevice) -> DeviceIds {
    DeviceIds {
        device_id: ids::format_device_id(device.card_vendor, device.card_prod_id),
        hardware_ids: ids::format_hardware_ids(
            device.card_vendor,
            device.card_prod_id,
            device.log_vendor_letters(),
            device.log_prod_id,
        ),
        compatible_ids: ids::format_compatible_ids(&device.compatible_ids),
        instance_id: ids::format_instance_id(device.serial_number),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// An `IsaBus` with no attached cards: every read comes back `0xff`, so
    /// isolation always completes with zero cards and no conflict.
    struct NullBus;

    impl IsaBus for NullBus {
        fn write_address(&mut self, _reg: u8) {}
        fn write_data(&mut self, _value: u8) {}
        fn read_data(&mut self) -> u8 {
            0xff
        }
        fn stall(&mut self, _nanoseconds: u64) {}
        fn set_read_data_port(&mut self, _port: u16) {}
    }

    #[test]
    fn only_the_working_state_maps_to_d0() {
        assert_eq!(device_power_state(SystemPowerState::Working), DevicePowerState::D0);
        assert_eq!(device_power_state(SystemPowerState::Sleeping1), DevicePowerState::D3);
        assert_eq!(device_power_state(SystemPowerState::Sleeping2), DevicePowerState::D3);
        assert_eq!(device_power_state(SystemPowerState::Sleeping3), DevicePowerState::D3);
        assert_eq!(device_power_state(SystemPowerState::Shutdown), DevicePowerState::D3);
    }

    #[test]
    fn dispatch_read_port_relays_unhandled_minor_codes() {
        let bus = Bus::new(0);
        let mut isa = NullBus;
        assert!(matches!(
            dispatch_read_port(&bus, &mut isa, Request::QueryResources, None),
            Err(IsaPnpError::HostRelayed)
        ));
        assert!(matches!(
            dispatch_read_port(&bus, &mut isa, Request::UsageNotification, None),
            Err(IsaPnpError::HostRelayed)
        ));
    }

    #[test]
    fn read_port_start_with_no_cards_reports_started_and_pins_the_port() {
        let bus = Bus::new(0);
        let mut isa = NullBus;
        let response = dispatch_read_port(&bus, &mut isa, Request::Start, Some(0x274)).unwrap();
        assert!(matches!(response, Response::Started));
        assert_eq!(bus.read_data_port(), Some(0x274));
        assert!(!*bus.needs_rebalance.lock());
    }

    #[test]
    fn read_port_start_when_already_pinned_reprobes_instead_of_requesting_rebalance() {
        let bus = Bus::new(0);
        *bus.read_port.lock() = Some(0x274);
        let mut isa = NullBus;
        let response = dispatch_read_port(&bus, &mut isa, Request::Start, None).unwrap();
        assert!(matches!(response, Response::Started));
    }

    #[test]
    fn find_device_rejects_unknown_csn_ldn() {
        let devices: Vec<LogicalDevice> = Vec::new();
        assert!(matches!(find_device(&devices, 1, 0), Err(IsaPnpError::DeviceAbsent)));
    }

    #[test]
    fn read_port_capabilities_carry_the_full_power_state_table() {
        let bus = Bus::new(0);
        let mut isa = NullBus;
        let response = dispatch_read_port(&bus, &mut isa, Request::QueryCapabilities, None).unwrap();
        let Response::Capabilities(capabilities) = response else {
            panic!("expected a capabilities response");
        };
        assert!(capabilities.raw_device_ok);
        assert!(capabilities.silent_install);
        assert_eq!(capabilities.power_states.len(), ALL_SYSTEM_POWER_STATES.len());
        assert!(capabilities
            .power_states
            .contains(&(SystemPowerState::Working, DevicePowerState::D0)));
        assert!(capabilities
            .power_states
            .contains(&(SystemPowerState::Shutdown, DevicePowerState::D3)));
    }
}
