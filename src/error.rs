/// Errors surfaced by the frame codec and the command session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// No frame arrived within the poll budget.
    #[error("no reply within the poll budget")]
    Timeout,

    /// Bytes arrived but the only candidate frames failed their checksum.
    #[error("checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// Bytes arrived but never formed a well-shaped frame.
    #[error("malformed frame")]
    Malformed,

    /// The sensor replied but echoed a different value than requested.
    #[error("sensor rejected the requested setting")]
    Rejected,

    /// Valid frames arrived, none of them answering the outstanding request.
    #[error("unexpected frame")]
    UnexpectedFrame,

    /// An argument is outside the range the sensor accepts.
    #[error("invalid argument")]
    InvalidArg,

    #[error("serial read failure")]
    ReadFailure,

    #[error("serial write failure")]
    WriteFailure,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_mismatch_display() {
        let err = Error::ChecksumMismatch {
            expected: 0xAB,
            actual: 0x0F,
        };
        let s = format!("{}", err);
        assert!(s.contains("expected 0xab"));
        assert!(s.contains("got 0x0f"));
    }

    #[test]
    fn timeout_display() {
        assert_eq!(Error::Timeout.to_string(), "no reply within the poll budget");
    }
}
