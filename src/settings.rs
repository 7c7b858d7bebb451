use crate::types::{ErrorType, SettingsParameter};
use enum_map::{enum_map, EnumMap};
use num_traits::FromPrimitive;

/// A full vector of the six standard connection parameters, indexed by
/// [`SettingsParameter`]. Two of these live on every connection: what we
/// advertised (LOCAL) and what the peer advertised (REMOTE).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings(EnumMap<SettingsParameter, u32>);

impl Settings {
    /// The pre-SETTINGS defaults every endpoint starts from per the RFC.
    #[must_use]
    pub fn standard() -> Self {
        Self(enum_map! {
            SettingsParameter::HeaderTableSize => 4096,
            SettingsParameter::EnablePush => 1,
            SettingsParameter::MaxConcurrentStreams => u32::MAX,
            SettingsParameter::InitialWindowSize => 65_535,
            SettingsParameter::MaxFrameSize => 16_384,
            SettingsParameter::MaxHeaderListSize => u32::MAX,
        })
    }

    /// What the peer is assumed to accept before its first SETTINGS arrives,
    /// in case we want to send frames before that without getting told off.
    #[must_use]
    pub fn conservative() -> Self {
        let mut settings = Self::standard();
        settings.set(SettingsParameter::EnablePush, 0);
        settings.set(SettingsParameter::MaxConcurrentStreams, 100);
        settings
    }

    /// The values we advertise in our first SETTINGS frame.
    #[must_use]
    pub fn initial() -> Self {
        let mut settings = Self::standard();
        settings.set(SettingsParameter::MaxConcurrentStreams, 1024);
        settings
    }

    #[must_use]
    pub fn get(&self, parameter: SettingsParameter) -> u32 {
        self.0[parameter]
    }

    pub fn set(&mut self, parameter: SettingsParameter, value: u32) {
        self.0[parameter] = value;
    }

    #[must_use]
    pub fn header_table_size(&self) -> u32 {
        self.0[SettingsParameter::HeaderTableSize]
    }

    #[must_use]
    pub fn enable_push(&self) -> u32 {
        self.0[SettingsParameter::EnablePush]
    }

    #[must_use]
    pub fn max_concurrent_streams(&self) -> u32 {
        self.0[SettingsParameter::MaxConcurrentStreams]
    }

    #[must_use]
    pub fn initial_window_size(&self) -> u32 {
        self.0[SettingsParameter::InitialWindowSize]
    }

    #[must_use]
    pub fn max_frame_size(&self) -> u32 {
        self.0[SettingsParameter::MaxFrameSize]
    }

    #[must_use]
    pub fn max_header_list_size(&self) -> u32 {
        self.0[SettingsParameter::MaxHeaderListSize]
    }

    /// Wire payload of a SETTINGS frame carrying every parameter that differs
    /// from `previous` (a key/value entry is 6 octets).
    #[must_use]
    pub fn delta_from(&self, previous: &Settings) -> Vec<u8> {
        let mut payload = Vec::with_capacity(6 * 6);
        for (parameter, &value) in self.0.iter() {
            if previous.0[parameter] != value {
                payload.extend_from_slice(&(parameter as u16).to_be_bytes());
                payload.extend_from_slice(&value.to_be_bytes());
            }
        }
        payload
    }

    /// Applies the entries of a SETTINGS payload in order.
    /// >An endpoint that receives a SETTINGS frame with any unknown or
    /// >unsupported identifier MUST ignore that setting.
    pub fn apply_payload(&mut self, payload: &[u8]) {
        for entry in payload.chunks_exact(6) {
            let key = u16::from_be_bytes([entry[0], entry[1]]);
            let value = u32::from_be_bytes([entry[2], entry[3], entry[4], entry[5]]);
            if let Some(parameter) = SettingsParameter::from_u16(key) {
                self.0[parameter] = value;
            }
        }
    }

    /// Bounds the RFC attaches to individual parameters; the error carries the
    /// wire code a violation must be reported with.
    pub fn check(&self) -> Result<(), (ErrorType, &'static str)> {
        if self.enable_push() > 1 {
            return Err((ErrorType::ProtocolError, "enable_push out of bounds"));
        }
        if self.initial_window_size() > 0x7FFF_FFFF {
            return Err((ErrorType::FlowControlError, "initial_window_size too big"));
        }
        if !(16_384..=16_777_215).contains(&self.max_frame_size()) {
            return Err((ErrorType::ProtocolError, "max_frame_size out of bounds"));
        }
        Ok(())
    }
}
