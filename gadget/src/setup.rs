//! Chapter-9 control-request and endpoint-descriptor data types.

fn get_u16(b0: u8, b1: u8) -> u16 {
    (b0 as u16) | ((b1 as u16) << 8)
}

/// The eight-byte payload of a SETUP transaction, decoded.
#[derive(Debug, Copy, Clone)]
pub struct SetupData {
    pub request_type: DeviceRequestType,
    pub request_code: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl SetupData {
    /// Decode a setup packet read from the control endpoint's FIFO.
    pub fn parse(p: &[u8]) -> Option<Self> {
        if p.len() < 8 {
            return None;
        }
        Some(SetupData {
            request_type: DeviceRequestType(p[0]),
            request_code: p[1],
            value: get_u16(p[2], p[3]),
            index: get_u16(p[4], p[5]),
            length: get_u16(p[6], p[7]),
        })
    }

    /// If this is a standard request the controller core dispatches itself,
    /// return it. Anything else (descriptor reads, class and vendor
    /// requests) is forwarded to the function driver verbatim.
    pub fn standard_request(&self) -> Option<StandardRequest> {
        match self.request_type.request_type() {
            RequestType::Standard => match self.request_code {
                0 => Some(StandardRequest::GetStatus {
                    recipient_index: self.index,
                }),
                1 => Some(StandardRequest::ClearFeature {
                    feature: FeatureSelector::get(self.value),
                    recipient_index: self.index,
                }),
                3 => Some(StandardRequest::SetFeature {
                    feature: FeatureSelector::get(self.value),
                    recipient_index: self.index & 0xff,
                }),
                5 => Some(StandardRequest::SetAddress {
                    device_address: self.value,
                }),
                8 => Some(StandardRequest::GetConfiguration),
                9 => Some(StandardRequest::SetConfiguration {
                    configuration_value: (self.value & 0xff) as u8,
                }),
                11 => Some(StandardRequest::SetInterface {
                    interface: self.index,
                    alternate: self.value,
                }),
                _ => None,
            },
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StandardRequest {
    GetStatus {
        recipient_index: u16,
    },
    ClearFeature {
        feature: FeatureSelector,
        recipient_index: u16,
    },
    SetFeature {
        feature: FeatureSelector,
        recipient_index: u16,
    },
    SetAddress {
        device_address: u16,
    },
    GetConfiguration,
    SetConfiguration {
        configuration_value: u8,
    },
    SetInterface {
        interface: u16,
        alternate: u16,
    },
}

/// The `bmRequestType` byte of a setup packet.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DeviceRequestType(pub u8);

impl DeviceRequestType {
    pub fn transfer_direction(self) -> TransferDirection {
        match self.0 & (1 << 7) {
            0 => TransferDirection::HostToDevice,
            _ => TransferDirection::DeviceToHost,
        }
    }

    pub fn request_type(self) -> RequestType {
        match (self.0 & (0b11 << 5)) >> 5 {
            0 => RequestType::Standard,
            1 => RequestType::Class,
            2 => RequestType::Vendor,
            _ => RequestType::Reserved,
        }
    }

    pub fn recipient(self) -> Recipient {
        match self.0 & 0b11111 {
            0 => Recipient::Device,
            1 => Recipient::Interface,
            2 => Recipient::Endpoint,
            3 => Recipient::Other,
            _ => Recipient::Reserved,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransferDirection {
    HostToDevice,
    DeviceToHost,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RequestType {
    Standard,
    Class,
    Vendor,
    Reserved,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Recipient {
    Device,
    Interface,
    Endpoint,
    Other,
    Reserved,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FeatureSelector {
    EndpointHalt,
    DeviceRemoteWakeup,
    TestMode,
    Unknown,
}

impl FeatureSelector {
    pub fn get(value: u16) -> Self {
        match value {
            0 => FeatureSelector::EndpointHalt,
            1 => FeatureSelector::DeviceRemoteWakeup,
            2 => FeatureSelector::TestMode,
            _ => FeatureSelector::Unknown,
        }
    }
}

/// Endpoint number plus direction bit, as carried in `bEndpointAddress`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EndpointAddress(u8);

impl EndpointAddress {
    pub const fn new(endpoint: usize, direction: TransferDirection) -> Self {
        EndpointAddress(endpoint as u8 & 0xf | (direction as u8) << 7)
    }

    pub fn index(self) -> usize {
        (self.0 & 0xf) as usize
    }

    pub fn transfer_direction(self) -> TransferDirection {
        match self.0 & (1 << 7) {
            0 => TransferDirection::HostToDevice,
            _ => TransferDirection::DeviceToHost,
        }
    }

    /// True for device-to-host (IN) endpoints.
    pub fn is_in(self) -> bool {
        self.transfer_direction() == TransferDirection::DeviceToHost
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransferType {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

/// The subset of an endpoint descriptor a controller driver consumes when an
/// endpoint is enabled.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub endpoint_address: EndpointAddress,
    pub transfer_type: TransferType,
    pub max_packet_size: u16,
    pub interval: u8,
}
