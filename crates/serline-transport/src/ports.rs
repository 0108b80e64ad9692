use crate::error::{Result, TransportError};

/// Kind of bus a port sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Usb,
    Pci,
    Bluetooth,
    Unknown,
}

impl PortKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PortKind::Usb => "usb",
            PortKind::Pci => "pci",
            PortKind::Bluetooth => "bluetooth",
            PortKind::Unknown => "unknown",
        }
    }
}

/// A serial port discovered on this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    pub kind: PortKind,
    /// USB vendor ID, when the port is a USB device.
    pub vid: Option<u16>,
    /// USB product ID, when the port is a USB device.
    pub pid: Option<u16>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

impl From<serialport::SerialPortInfo> for PortInfo {
    fn from(info: serialport::SerialPortInfo) -> Self {
        let mut out = PortInfo {
            name: info.port_name,
            kind: PortKind::Unknown,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial_number: None,
        };
        match info.port_type {
            serialport::SerialPortType::UsbPort(usb) => {
                out.kind = PortKind::Usb;
                out.vid = Some(usb.vid);
                out.pid = Some(usb.pid);
                out.manufacturer = usb.manufacturer;
                out.product = usb.product;
                out.serial_number = usb.serial_number;
            }
            serialport::SerialPortType::PciPort => out.kind = PortKind::Pci,
            serialport::SerialPortType::BluetoothPort => out.kind = PortKind::Bluetooth,
            serialport::SerialPortType::Unknown => {}
        }
        out
    }
}

/// List serial ports available on this host, sorted by name.
pub fn available_ports() -> Result<Vec<PortInfo>> {
    let mut ports: Vec<PortInfo> = serialport::available_ports()
        .map_err(TransportError::Enumerate)?
        .into_iter()
        .map(PortInfo::from)
        .collect();
    ports.sort_by(|a, b| a.name.cmp(&b.name));
    tracing::debug!(count = ports.len(), "enumerated serial ports");
    Ok(ports)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pci_port_has_no_usb_ids() {
        let info = PortInfo::from(serialport::SerialPortInfo {
            port_name: "/dev/ttyS0".to_string(),
            port_type: serialport::SerialPortType::PciPort,
        });
        assert_eq!(info.kind, PortKind::Pci);
        assert_eq!(info.vid, None);
        assert_eq!(info.kind.as_str(), "pci");
    }

    #[test]
    fn unknown_port_keeps_name() {
        let info = PortInfo::from(serialport::SerialPortInfo {
            port_name: "/dev/ttyACM3".to_string(),
            port_type: serialport::SerialPortType::Unknown,
        });
        assert_eq!(info.name, "/dev/ttyACM3");
        assert_eq!(info.kind, PortKind::Unknown);
    }
}
