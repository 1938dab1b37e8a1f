//! Device requests carried by SETUP packets

use usb_device::{
    control::{Recipient, Request, RequestType},
    UsbDirection,
};

/// Length of every SETUP packet's data
pub const SETUP_PACKET_LEN: usize = 8;

/// An 8-byte device request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SetupPacket {
    /// `bmRequestType`
    pub request_type: u8,
    /// `bRequest`
    pub request: u8,
    /// `wValue`
    pub value: u16,
    /// `wIndex`
    pub index: u16,
    /// `wLength`
    pub length: u16,
}

impl SetupPacket {
    /// Parse a SETUP packet
    ///
    /// Returns `None` if `data` isn't exactly 8 bytes.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let data: &[u8; SETUP_PACKET_LEN] = data.try_into().ok()?;
        Some(SetupPacket {
            request_type: data[0],
            request: data[1],
            value: u16::from_le_bytes([data[2], data[3]]),
            index: u16::from_le_bytes([data[4], data[5]]),
            length: u16::from_le_bytes([data[6], data[7]]),
        })
    }

    /// The packet as it appears on the wire
    pub fn to_bytes(&self) -> [u8; SETUP_PACKET_LEN] {
        let [v0, v1] = self.value.to_le_bytes();
        let [i0, i1] = self.index.to_le_bytes();
        let [l0, l1] = self.length.to_le_bytes();
        [self.request_type, self.request, v0, v1, i0, i1, l0, l1]
    }

    /// Direction of the data stage
    pub fn direction(&self) -> UsbDirection {
        UsbDirection::from(self.request_type)
    }

    pub fn kind(&self) -> RequestType {
        match (self.request_type >> 5) & 0b11 {
            0 => RequestType::Standard,
            1 => RequestType::Class,
            2 => RequestType::Vendor,
            _ => RequestType::Reserved,
        }
    }

    pub fn recipient(&self) -> Recipient {
        match self.request_type & 0b1_1111 {
            0 => Recipient::Device,
            1 => Recipient::Interface,
            2 => Recipient::Endpoint,
            3 => Recipient::Other,
            _ => Recipient::Reserved,
        }
    }

    fn is_standard_device_out(&self) -> bool {
        self.direction() == UsbDirection::Out
            && self.kind() == RequestType::Standard
            && self.recipient() == Recipient::Device
    }

    /// If this is a standard SET_ADDRESS request, returns the new address
    pub fn set_address(&self) -> Option<u8> {
        (self.is_standard_device_out() && self.request == Request::SET_ADDRESS)
            .then_some(self.value as u8)
    }

    /// If this is a standard SET_CONFIGURATION request, returns the configuration value
    pub fn set_configuration(&self) -> Option<u8> {
        (self.is_standard_device_out() && self.request == Request::SET_CONFIGURATION)
            .then_some(self.value as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GET_DEVICE_DESCRIPTOR: [u8; 8] = [0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x40, 0x00];

    #[test]
    fn parse_get_descriptor() {
        let setup = SetupPacket::parse(&GET_DEVICE_DESCRIPTOR).unwrap();
        assert_eq!(setup.request, Request::GET_DESCRIPTOR);
        assert_eq!(setup.value, 0x0100);
        assert_eq!(setup.length, 64);
        assert_eq!(setup.direction(), UsbDirection::In);
        assert_eq!(setup.kind(), RequestType::Standard);
        assert_eq!(setup.recipient(), Recipient::Device);
        assert_eq!(setup.set_address(), None);
        assert_eq!(setup.to_bytes(), GET_DEVICE_DESCRIPTOR);
    }

    #[test]
    fn parse_wrong_length() {
        assert!(SetupPacket::parse(&GET_DEVICE_DESCRIPTOR[..7]).is_none());
        assert!(SetupPacket::parse(&[0; 9]).is_none());
    }

    #[test]
    fn standard_device_requests() {
        let set_address = SetupPacket::parse(&[0x00, 0x05, 0x05, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(set_address.set_address(), Some(5));
        assert_eq!(set_address.set_configuration(), None);

        let set_configuration = SetupPacket::parse(&[0x00, 0x09, 0x01, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(set_configuration.set_configuration(), Some(1));

        // Same request code, but a class request to an interface
        let class = SetupPacket::parse(&[0x21, 0x09, 0x01, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(class.kind(), RequestType::Class);
        assert_eq!(class.recipient(), Recipient::Interface);
        assert_eq!(class.set_configuration(), None);
    }
}
