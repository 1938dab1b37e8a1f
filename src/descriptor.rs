//! Static descriptor tree
//!
//! The tree describes the device to the driver: which configurations exist, and
//! which endpoints each configuration activates. The types serialize into their
//! wire format, so a request dispatcher can answer GET_DESCRIPTOR from the same
//! tables.

use usb_device::descriptor::descriptor_type;
use usb_device::{endpoint::EndpointAddress, UsbDirection};

/// Endpoint transfer type, from `bmAttributes`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferType {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

/// Device descriptor, and the root of the descriptor tree
#[derive(Debug)]
pub struct DeviceDescriptor {
    /// `bcdUSB`
    pub usb_version: u16,
    pub class: u8,
    pub sub_class: u8,
    pub protocol: u8,
    /// Endpoint 0's maximum packet size; one of 8, 16, 32 or 64
    pub max_packet_size_0: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    /// `bcdDevice`
    pub device_release: u16,
    /// String index of the manufacturer, or 0
    pub manufacturer: u8,
    /// String index of the product, or 0
    pub product: u8,
    /// String index of the serial number, or 0
    pub serial_number: u8,
    pub configurations: &'static [ConfigurationDescriptor],
    /// Language IDs reported in string descriptor 0
    pub language_ids: &'static [u16],
    /// String descriptors 1 and up
    pub strings: &'static [&'static str],
}

#[derive(Debug)]
pub struct ConfigurationDescriptor {
    /// `bConfigurationValue`; never 0
    pub configuration_value: u8,
    /// String index, or 0
    pub configuration: u8,
    /// `bmAttributes`
    pub attributes: u8,
    /// In 2 mA units
    pub max_power: u8,
    pub interfaces: &'static [InterfaceDescriptor],
}

#[derive(Debug)]
pub struct InterfaceDescriptor {
    pub interface_number: u8,
    pub alternate_setting: u8,
    pub class: u8,
    pub sub_class: u8,
    pub protocol: u8,
    /// String index, or 0
    pub interface: u8,
    pub endpoints: &'static [EndpointDescriptor],
}

#[derive(Debug)]
pub struct EndpointDescriptor {
    /// `bEndpointAddress`
    pub address: u8,
    /// `bmAttributes`
    pub attributes: u8,
    pub max_packet_size: u16,
    pub interval: u8,
}

const DEVICE_LEN: usize = 18;
const CONFIGURATION_LEN: usize = 9;
const INTERFACE_LEN: usize = 9;
const ENDPOINT_LEN: usize = 7;

/// Copy `bytes` to the front of `buffer`, returning the length
fn put(buffer: &mut [u8], bytes: &[u8]) -> Option<usize> {
    buffer.get_mut(..bytes.len())?.copy_from_slice(bytes);
    Some(bytes.len())
}

impl DeviceDescriptor {
    /// Find the configuration with `bConfigurationValue == value`
    pub fn configuration(&self, value: u8) -> Option<&'static ConfigurationDescriptor> {
        self.configurations
            .iter()
            .find(|config| config.configuration_value == value)
    }

    /// Serialize the device descriptor into `buffer`
    ///
    /// Returns `None` if `buffer` is too small.
    pub fn write_to(&self, buffer: &mut [u8]) -> Option<usize> {
        let [usb0, usb1] = self.usb_version.to_le_bytes();
        let [vid0, vid1] = self.vendor_id.to_le_bytes();
        let [pid0, pid1] = self.product_id.to_le_bytes();
        let [rel0, rel1] = self.device_release.to_le_bytes();
        put(
            buffer,
            &[
                DEVICE_LEN as u8,
                descriptor_type::DEVICE,
                usb0,
                usb1,
                self.class,
                self.sub_class,
                self.protocol,
                self.max_packet_size_0,
                vid0,
                vid1,
                pid0,
                pid1,
                rel0,
                rel1,
                self.manufacturer,
                self.product,
                self.serial_number,
                self.configurations.len() as u8,
            ],
        )
    }

    /// Serialize string descriptor `index` into `buffer`
    ///
    /// Index 0 is the language ID table. Returns `None` if there's no such string,
    /// or if `buffer` is too small.
    pub fn write_string(&self, index: u8, buffer: &mut [u8]) -> Option<usize> {
        if index == 0 {
            return write_language_ids(self.language_ids, buffer);
        }
        let string = self.strings.get(usize::from(index) - 1)?;
        write_string(string, buffer)
    }
}

impl ConfigurationDescriptor {
    /// `wTotalLength`: this descriptor, and every interface and endpoint descriptor
    pub fn total_length(&self) -> usize {
        CONFIGURATION_LEN
            + self
                .interfaces
                .iter()
                .map(|interface| INTERFACE_LEN + ENDPOINT_LEN * interface.endpoints.len())
                .sum::<usize>()
    }

    /// Every endpoint in this configuration, in declaration order
    pub fn endpoints(&self) -> impl Iterator<Item = &'static EndpointDescriptor> {
        self.interfaces
            .iter()
            .flat_map(|interface| interface.endpoints.iter())
    }

    /// Serialize the configuration, and all of its interfaces and endpoints,
    /// into `buffer`
    ///
    /// Returns `None` if `buffer` is too small.
    pub fn write_to(&self, buffer: &mut [u8]) -> Option<usize> {
        let [len0, len1] = (self.total_length() as u16).to_le_bytes();
        let mut written = put(
            buffer,
            &[
                CONFIGURATION_LEN as u8,
                descriptor_type::CONFIGURATION,
                len0,
                len1,
                self.interfaces.len() as u8,
                self.configuration_value,
                self.configuration,
                self.attributes,
                self.max_power,
            ],
        )?;
        for interface in self.interfaces {
            written += interface.write_to(buffer.get_mut(written..)?)?;
            for endpoint in interface.endpoints {
                written += endpoint.write_to(buffer.get_mut(written..)?)?;
            }
        }
        Some(written)
    }
}

impl InterfaceDescriptor {
    fn write_to(&self, buffer: &mut [u8]) -> Option<usize> {
        put(
            buffer,
            &[
                INTERFACE_LEN as u8,
                descriptor_type::INTERFACE,
                self.interface_number,
                self.alternate_setting,
                self.endpoints.len() as u8,
                self.class,
                self.sub_class,
                self.protocol,
                self.interface,
            ],
        )
    }
}

impl EndpointDescriptor {
    pub fn address(&self) -> EndpointAddress {
        EndpointAddress::from(self.address)
    }

    pub fn number(&self) -> u8 {
        self.address().index() as u8
    }

    pub fn direction(&self) -> UsbDirection {
        self.address().direction()
    }

    pub fn transfer_type(&self) -> TransferType {
        match self.attributes & 0b11 {
            0 => TransferType::Control,
            1 => TransferType::Isochronous,
            2 => TransferType::Bulk,
            _ => TransferType::Interrupt,
        }
    }

    pub fn max_packet_size(&self) -> usize {
        usize::from(self.max_packet_size & 0x7FF)
    }

    fn write_to(&self, buffer: &mut [u8]) -> Option<usize> {
        let [mps0, mps1] = self.max_packet_size.to_le_bytes();
        put(
            buffer,
            &[
                ENDPOINT_LEN as u8,
                descriptor_type::ENDPOINT,
                self.address,
                self.attributes,
                mps0,
                mps1,
                self.interval,
            ],
        )
    }
}

/// Serialize `string` as a UTF-16LE string descriptor
///
/// Returns `None` if `buffer` is too small, or if the descriptor wouldn't fit in
/// its one-byte length.
pub fn write_string(string: &str, buffer: &mut [u8]) -> Option<usize> {
    let len = 2 + 2 * string.encode_utf16().count();
    if len > usize::from(u8::MAX) || len > buffer.len() {
        return None;
    }
    buffer[0] = len as u8;
    buffer[1] = descriptor_type::STRING;
    for (unit, dst) in string.encode_utf16().zip(buffer[2..len].chunks_exact_mut(2)) {
        dst.copy_from_slice(&unit.to_le_bytes());
    }
    Some(len)
}

/// Serialize string descriptor 0, the supported language IDs
pub fn write_language_ids(language_ids: &[u16], buffer: &mut [u8]) -> Option<usize> {
    let len = 2 + 2 * language_ids.len();
    if len > usize::from(u8::MAX) || len > buffer.len() {
        return None;
    }
    buffer[0] = len as u8;
    buffer[1] = descriptor_type::STRING;
    for (id, dst) in language_ids.iter().zip(buffer[2..len].chunks_exact_mut(2)) {
        dst.copy_from_slice(&id.to_le_bytes());
    }
    Some(len)
}
