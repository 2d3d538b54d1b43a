/// Protocol for 93C46 style Microwire EEPROMs, 1 kbit organized as 64 x 16bit
/// (ORG pin high) or 128 x 8bit (ORG pin low).
///
/// Sometimes called "SPI", but it really isn't. There are separate pins for
/// data IN and OUT, CHIP SELECT is active high, and instructions aren't byte
/// aligned.
///
/// Instructions:
/// - Startbit: "1"
/// - 2-bit Opcode
/// - 6-bit (x16) or 7-bit (x8) Address
///
/// Some instructions have a DATA phase following (either send or recv) for 16
/// (x16) or 8 (x8) bits.
///
/// Opcodes: (@ address, shown for x16; x8 has one more low address bit)
/// - 0b11: ERASE at address (set all bits to "1")
/// - 0b00 @ 0b00????: EWDS (erase/write disable), no DATA
/// - 0b00 @ 0b01????: WRAL (write all), send DATA
/// - 0b00 @ 0b10????: ERAL (erase all), no DATA
/// - 0b00 @ 0b11????: EWEN (erase/write enable), no DATA
/// - 0b10: READ from address, chip sends dummy "0" then DATA
/// - 0b01: WRITE to address, send DATA
///
/// ERASE, ERAL, WRITE and WRAL only work after EWEN; they start a self-timed
/// programming cycle when CS drops. With CS raised again DO stays LOW while
/// the chip is BUSY and goes HIGH when it is READY.

mod error;
mod frame;
mod hardware;
mod low_level;
mod operations;

pub use self::error::EepromError;

pub use self::frame::{
	Command,
	Field,
	Frame,
	Organization,
};

pub use self::hardware::{
	Direction,
	Hardware,
	Pin,
	Pins,
	Timing,
	busy_delay,
};

pub use self::operations::{
	Eeprom,
	ProgrammingEnabled,
	Reader,
};
