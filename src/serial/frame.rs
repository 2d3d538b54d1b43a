use std::fmt;

// 2-bit opcodes following the start bit
const OPCODE_EXTENDED: u16 = 0b00;
const OPCODE_WRITE: u16 = 0b01;
const OPCODE_READ: u16 = 0b10;
const OPCODE_ERASE: u16 = 0b11;

// extended instructions: 2-bit control code in the top address bits
const CONTROL_EWDS: u16 = 0b00;
const CONTROL_WRAL: u16 = 0b01;
const CONTROL_ERAL: u16 = 0b10;
const CONTROL_EWEN: u16 = 0b11;

const OPCODE_WIDTH: u8 = 2;
const CONTROL_WIDTH: u8 = 2;

/// Memory organization selected by the ORG pin of the chip.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Organization {
	/// 64 x 16 bit (ORG high)
	Word16,
	/// 128 x 8 bit (ORG low)
	Byte8,
}

impl Organization {
	pub fn address_width(self) -> u8 {
		match self {
			Organization::Word16 => 6,
			Organization::Byte8 => 7,
		}
	}

	pub fn data_width(self) -> u8 {
		match self {
			Organization::Word16 => 16,
			Organization::Byte8 => 8,
		}
	}

	pub fn cells(self) -> usize {
		1 << self.address_width()
	}

	pub fn address_mask(self) -> u8 {
		((1u16 << self.address_width()) - 1) as u8
	}

	pub fn data_mask(self) -> u16 {
		(((1u32) << self.data_width()) - 1) as u16
	}

	pub fn from_address_width(width: usize) -> Option<Self> {
		match width {
			6 => Some(Organization::Word16),
			7 => Some(Organization::Byte8),
			_ => None,
		}
	}
}

impl Default for Organization {
	fn default() -> Self {
		Organization::Word16
	}
}

impl fmt::Display for Organization {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Organization::Word16 => write!(f, "64 x 16 bit"),
			Organization::Byte8 => write!(f, "128 x 8 bit"),
		}
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Field {
	pub value: u16,
	pub width: u8,
}

impl Field {
	pub fn new(value: u16, width: u8) -> Self {
		assert!(width <= 16);
		let mask = ((1u32 << width) - 1) as u16;
		Field {
			value: value & mask,
			width,
		}
	}

	/// bits starting with the most significant one
	pub fn bits(self) -> impl Iterator<Item = bool> {
		let value = self.value;
		(0..self.width).rev().map(move |bit| 0 != value & (1u16 << bit))
	}
}

/// Ordered list of fields, sent most significant bit first.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct Frame {
	fields: Vec<Field>,
}

impl Frame {
	pub fn new() -> Self {
		Frame::default()
	}

	/// appends `value` truncated to `width` bits
	pub fn push(mut self, value: u16, width: u8) -> Self {
		self.fields.push(Field::new(value, width));
		self
	}

	pub fn fields(&self) -> &[Field] {
		&self.fields
	}

	/// number of clock cycles needed to send the frame
	pub fn len(&self) -> usize {
		self.fields.iter().map(|f| f.width as usize).sum()
	}

	pub fn is_empty(&self) -> bool {
		0 == self.len()
	}

	pub fn bits<'a>(&'a self) -> impl Iterator<Item = bool> + 'a {
		self.fields.iter().flat_map(|f| f.bits())
	}
}

impl fmt::Display for Frame {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		for bit in self.bits() {
			write!(f, "{}", if bit { '1' } else { '0' })?;
		}
		Ok(())
	}
}

/// Chip instructions.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Command {
	/// EWDS
	EraseWriteDisable,
	/// EWEN
	EraseWriteEnable,
	/// ERAL
	EraseAll,
	/// WRAL
	WriteAll(u16),
	Write {
		address: u8,
		data: u16,
	},
	Erase {
		address: u8,
	},
	Read {
		address: u8,
	},
}

impl Command {
	pub fn name(&self) -> &'static str {
		match self {
			Command::EraseWriteDisable => "EWDS",
			Command::EraseWriteEnable => "EWEN",
			Command::EraseAll => "ERAL",
			Command::WriteAll(_) => "WRAL",
			Command::Write { .. } => "WRITE",
			Command::Erase { .. } => "ERASE",
			Command::Read { .. } => "READ",
		}
	}

	/// whether the chip only executes it with the write-enable latch set;
	/// those also start a self-timed programming cycle
	pub fn needs_write_enable(&self) -> bool {
		match self {
			Command::EraseAll
			| Command::WriteAll(_)
			| Command::Write { .. }
			| Command::Erase { .. } => true,
			Command::EraseWriteDisable
			| Command::EraseWriteEnable
			| Command::Read { .. } => false,
		}
	}

	/// start bit, opcode, address (or control code) and data for the given
	/// organization
	pub fn frame(&self, org: Organization) -> Frame {
		let address_width = org.address_width();
		let data_width = org.data_width();
		let control = |code: u16| code << (address_width - CONTROL_WIDTH);

		let frame = Frame::new().push(1, 1);
		match *self {
			Command::EraseWriteDisable => frame
				.push(OPCODE_EXTENDED, OPCODE_WIDTH)
				.push(control(CONTROL_EWDS), address_width),
			Command::EraseWriteEnable => frame
				.push(OPCODE_EXTENDED, OPCODE_WIDTH)
				.push(control(CONTROL_EWEN), address_width),
			Command::EraseAll => frame
				.push(OPCODE_EXTENDED, OPCODE_WIDTH)
				.push(control(CONTROL_ERAL), address_width),
			Command::WriteAll(data) => frame
				.push(OPCODE_EXTENDED, OPCODE_WIDTH)
				.push(control(CONTROL_WRAL), address_width)
				.push(data, data_width),
			Command::Write { address, data } => frame
				.push(OPCODE_WRITE, OPCODE_WIDTH)
				.push(address as u16, address_width)
				.push(data, data_width),
			Command::Erase { address } => frame
				.push(OPCODE_ERASE, OPCODE_WIDTH)
				.push(address as u16, address_width),
			// same address width as every other instruction; a wider (8 bit)
			// address in x16 mode would already be clocked as data by the chip
			Command::Read { address } => frame
				.push(OPCODE_READ, OPCODE_WIDTH)
				.push(address as u16, address_width),
		}
	}
}

impl fmt::Display for Command {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Command::WriteAll(data) => write!(f, "{} 0x{:04x}", self.name(), data),
			Command::Write { address, data } => write!(f, "{} @{:02x} 0x{:04x}", self.name(), address, data),
			Command::Erase { address } | Command::Read { address } => write!(f, "{} @{:02x}", self.name(), address),
			_ => write!(f, "{}", self.name()),
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	// start bit + opcode/address field as a single number, and the data field
	fn split(frame: &Frame) -> (u16, u16, usize) {
		let fields = frame.fields();
		assert_eq!(Field::new(1, 1), fields[0], "frame must begin with a start bit");
		let head = (fields[1].value << fields[2].width) | fields[2].value;
		let head_width = (fields[1].width + fields[2].width) as usize;
		match fields.get(3) {
			Some(data) => (head, data.value, head_width),
			None => (head, 0, head_width),
		}
	}

	fn check_head(cmd: Command, org: Organization, expected: u16) {
		let (head, _, width) = split(&cmd.frame(org));
		let expected_width = match org {
			Organization::Word16 => 8,
			Organization::Byte8 => 9,
		};
		assert_eq!(expected_width, width, "{} in {:?}", cmd, org);
		assert_eq!(expected, head, "{} in {:?}: got 0x{:03x}, expected 0x{:03x}", cmd, org, head, expected);
	}

	#[test]
	fn control_codes() {
		let codes = [
			(Command::EraseWriteDisable, 0x00),
			(Command::WriteAll(0), 0x10),
			(Command::EraseAll, 0x20),
			(Command::EraseWriteEnable, 0x30),
		];
		for &(cmd, code) in codes.iter() {
			check_head(cmd, Organization::Word16, code);
			check_head(cmd, Organization::Byte8, code << 1);
		}
	}

	#[test]
	fn addressed_opcodes() {
		check_head(Command::Write { address: 0x05, data: 0 }, Organization::Word16, 0x45);
		check_head(Command::Read { address: 0x3f }, Organization::Word16, 0xbf);
		check_head(Command::Erase { address: 0x10 }, Organization::Word16, 0xd0);

		check_head(Command::Write { address: 0x05, data: 0 }, Organization::Byte8, 0x40 << 1 | 0x05);
		check_head(Command::Read { address: 0x7f }, Organization::Byte8, 0x80 << 1 | 0x7f);
		check_head(Command::Erase { address: 0x10 }, Organization::Byte8, 0xc0 << 1 | 0x10);
	}

	#[test]
	fn address_is_truncated() {
		check_head(Command::Erase { address: 0xff }, Organization::Word16, 0xc0 | 0x3f);
		check_head(Command::Erase { address: 0xff }, Organization::Byte8, 0xc0 << 1 | 0x7f);
		check_head(Command::Read { address: 0x41 }, Organization::Word16, 0x81);
	}

	#[test]
	fn data_is_truncated() {
		let (_, data, _) = split(&Command::Write { address: 0, data: 0xabcd }.frame(Organization::Byte8));
		assert_eq!(0xcd, data);
		let (_, data, _) = split(&Command::WriteAll(0xabcd).frame(Organization::Word16));
		assert_eq!(0xabcd, data);
	}

	#[test]
	fn frame_lengths() {
		let write = Command::Write { address: 1, data: 1 };
		assert_eq!(1 + 8 + 16, write.frame(Organization::Word16).len());
		assert_eq!(1 + 9 + 8, write.frame(Organization::Byte8).len());
		assert_eq!(9, Command::EraseWriteEnable.frame(Organization::Word16).len());
		assert_eq!(10, Command::EraseWriteEnable.frame(Organization::Byte8).len());
	}

	#[test]
	fn frame_bits_msb_first() {
		let frame = Command::Write { address: 0x05, data: 0x1234 }.frame(Organization::Word16);
		assert_eq!("1010001010001001000110100", frame.to_string());
	}

	#[test]
	fn organization_widths() {
		assert_eq!(64, Organization::Word16.cells());
		assert_eq!(128, Organization::Byte8.cells());
		assert_eq!(0x3f, Organization::Word16.address_mask());
		assert_eq!(0x7f, Organization::Byte8.address_mask());
		assert_eq!(0xffff, Organization::Word16.data_mask());
		assert_eq!(0x00ff, Organization::Byte8.data_mask());
		assert_eq!(Some(Organization::Byte8), Organization::from_address_width(7));
		assert_eq!(None, Organization::from_address_width(8));
	}
}
