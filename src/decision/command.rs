use std::fmt;

/// Instruction for the device's indicator LED.
///
/// Both sides of the control topic share one literal per variant. The device
/// firmware has to compare against [`ActuationCommand::payload`] exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActuationCommand {
    On,
    Off,
}

impl ActuationCommand {
    pub const ON_PAYLOAD: &'static str = "LED ON";
    pub const OFF_PAYLOAD: &'static str = "LED OFF";

    pub fn payload(&self) -> &'static str {
        match self {
            ActuationCommand::On => Self::ON_PAYLOAD,
            ActuationCommand::Off => Self::OFF_PAYLOAD,
        }
    }

    /// Exact-match parser for the control topic payload
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        if payload == Self::ON_PAYLOAD.as_bytes() {
            Some(ActuationCommand::On)
        } else if payload == Self::OFF_PAYLOAD.as_bytes() {
            Some(ActuationCommand::Off)
        } else {
            None
        }
    }
}

impl fmt::Display for ActuationCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.payload())
    }
}
