use std::time::Duration;

/// Protocol level failures; returned wrapped in `failure::Error`, use
/// `downcast_ref::<EepromError>()` to match on them.
#[derive(Clone, PartialEq, Eq, Debug, Fail)]
pub enum EepromError {
	#[fail(display = "{} refused: erase/write not enabled", operation)]
	WriteDisabled {
		operation: &'static str,
	},

	#[fail(display = "chip still busy after {:?}", timeout)]
	CompletionTimeout {
		timeout: Duration,
	},

	#[fail(display = "missing dummy 0 bit before read data (no chip or wrong organization?)")]
	MissingDummyBit,

	#[fail(display = "unsupported address width: {} bits", address_bits)]
	OrganizationUnknown {
		address_bits: usize,
	},

	#[fail(display = "image with {} cells doesn't fit into {} cells", len, cells)]
	ImageTooLarge {
		len: usize,
		cells: usize,
	},

	#[fail(display = "verify failed at {:02x}: expected {:04x}, chip has {:04x}", address, expected, found)]
	VerifyMismatch {
		address: usize,
		expected: u16,
		found: u16,
	},
}
