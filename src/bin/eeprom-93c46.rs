#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

extern crate eeprom_93c46;
use eeprom_93c46::*;

use std::fs;
use std::io::{
	self,
	Write,
};
use std::process::exit;
use std::str::FromStr;
use std::time::Duration;

use eeprom_93c46::gpio::SysfsGpio;

// decimal or 0x-prefixed hexadecimal
struct Number(u32);

impl FromStr for Number {
	type Err = failure::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let value = if s.starts_with("0x") || s.starts_with("0X") {
			u32::from_str_radix(&s[2..], 16)?
		} else {
			s.parse::<u32>()?
		};
		Ok(Number(value))
	}
}

fn get_param<T>(matches: &clap::ArgMatches, name: &str) -> AResult<T>
where
	T: std::str::FromStr,
	failure::Error: From<<T as std::str::FromStr>::Err>,
{
	let param = match matches.value_of(name) {
		Some(p) => p,
		None => bail!("missing parameter {}", name),
	};
	param.parse::<T>().map_err(|e| {
		let e = failure::Error::from(e);
		let msg = format!("invalid parameter {}: {}", name, e);
		e.context(msg).into()
	})
}

fn get_address(matches: &clap::ArgMatches, org: Organization) -> AResult<u8> {
	let Number(address) = get_param(matches, "ADDRESS")?;
	ensure!((address as usize) < org.cells(), "address 0x{:x} out of range (chip has {} cells)", address, org.cells());
	Ok(address as u8)
}

fn get_value(matches: &clap::ArgMatches, org: Organization) -> AResult<u16> {
	let Number(value) = get_param(matches, "VALUE")?;
	ensure!(value <= org.data_mask() as u32, "value 0x{:x} doesn't fit into {} bits", value, org.data_width());
	Ok(value as u16)
}

fn open_eeprom(matches: &clap::ArgMatches) -> AResult<Eeprom<SysfsGpio>> {
	let pins = Pins {
		chip_select: get_param::<Number>(matches, "chip_select")?.0,
		clock: get_param::<Number>(matches, "clock")?.0,
		data_in: get_param::<Number>(matches, "data_in")?.0,
		data_out: get_param::<Number>(matches, "data_out")?.0,
	};
	let mut timing = Timing::default();
	if matches.is_present("timeout") {
		timing.completion_timeout = Duration::from_millis(get_param::<Number>(matches, "timeout")?.0 as u64);
	}
	if matches.is_present("clock_delay") {
		timing.clock_delay_us = get_param::<Number>(matches, "clock_delay")?.0;
	}

	let mut ee = Eeprom::with_timing(SysfsGpio::new(), pins, timing).map_err(|e| {
		let msg = format!("couldn't set up GPIOs {:?}: {}", pins, e);
		failure::Error::from(e.context(msg))
	})?;
	if matches.is_present("x8") {
		ee.set_organization(Organization::Byte8);
	}
	Ok(ee)
}

// x16: big-endian words
fn image_from_bytes(data: &[u8], org: Organization) -> AResult<Vec<u16>> {
	match org {
		Organization::Word16 => {
			ensure!(0 == data.len() % 2, "image length {} not a multiple of 2", data.len());
			Ok(data.chunks(2).map(|w| (w[0] as u16) << 8 | (w[1] as u16)).collect())
		},
		Organization::Byte8 => Ok(data.iter().map(|&b| b as u16).collect()),
	}
}

fn image_to_bytes(image: &[u16], org: Organization) -> Vec<u8> {
	match org {
		Organization::Word16 => image.iter().flat_map(|&w| vec![(w >> 8) as u8, w as u8]).collect(),
		Organization::Byte8 => image.iter().map(|&w| w as u8).collect(),
	}
}

fn detect(ee: &mut Eeprom<SysfsGpio>) -> AResult<()> {
	let org = ee.detect_organization()?;
	if org != ee.organization() {
		warn!("Chip is organized as {}, but using {}", org, ee.organization());
	}
	println!("{}", org);
	Ok(())
}

fn dump(ee: &mut Eeprom<SysfsGpio>, sub_m: &clap::ArgMatches) -> AResult<()> {
	let org = ee.organization();
	let image = ee.dump()?;
	if sub_m.is_present("binary") {
		io::stdout().write_all(&image_to_bytes(&image, org))?;
	} else {
		for (address, word) in image.iter().enumerate() {
			match org {
				Organization::Word16 => println!("@{:02x}: {:04x}", address, word),
				Organization::Byte8 => println!("@{:02x}: {:02x}", address, word),
			}
		}
	}
	Ok(())
}

fn program(ee: &mut Eeprom<SysfsGpio>, sub_m: &clap::ArgMatches) -> AResult<()> {
	let file = match sub_m.value_of("FILE") {
		Some(f) => f,
		None => bail!("missing parameter FILE"),
	};
	let org = ee.organization();
	let data = fs::read(&file).map_err(|e| format_err!("couldn't read image {:?}: {}", file, e))?;
	let image = image_from_bytes(&data, org)?;

	info!("Programming {} cells", image.len());
	let mut prog = ee.start_programming()?;
	prog.program(&image)?;
	prog.finish()?;
	info!("Image verified successfully");
	Ok(())
}

fn main_app() -> AResult<()> {
	let matches = clap_app!(@app (app_from_crate!())
		(@setting SubcommandRequiredElseHelp)
		(global_setting: clap::AppSettings::VersionlessSubcommands)
		(@arg chip_select: --cs +takes_value +required "GPIO connected to CS (chip select)")
		(@arg clock: --sk +takes_value +required "GPIO connected to SK (clock)")
		(@arg data_in: --di +takes_value +required "GPIO connected to DI (data into the chip)")
		(@arg data_out: --("do") +takes_value +required "GPIO connected to DO (data out of the chip)")
		(@arg x8: --x8 "chip organized as 128 x 8 bit (ORG low) instead of 64 x 16 bit")
		(@arg timeout: --timeout +takes_value "maximum time in ms to wait for erase/write to complete")
		(@arg clock_delay: --("clock-delay") +takes_value "delay in us around each clock edge")
		(@subcommand detect =>
			(about: "detect chip organization")
		)
		(@subcommand read =>
			(about: "read one cell")
			(@arg ADDRESS: +required "cell address")
		)
		(@subcommand dump =>
			(about: "dump all cells")
			(@arg binary: -b --binary "write raw binary (x16: big-endian) to stdout")
		)
		(@subcommand write =>
			(about: "write one cell")
			(@arg ADDRESS: +required "cell address")
			(@arg VALUE: +required "value to write")
		)
		(@subcommand erase =>
			(about: "erase one cell")
			(@arg ADDRESS: +required "cell address")
		)
		(@subcommand write_all =>
			(about: "write value into all cells")
			(@arg VALUE: +required "value to write")
		)
		(@subcommand erase_all =>
			(about: "erase all cells")
		)
		(@subcommand program =>
			(about: "erase chip, write binary image (x16: big-endian) and verify it")
			(@arg FILE: +required "image file")
		)
	).get_matches();

	let mut ee = open_eeprom(&matches)?;
	let org = ee.organization();

	match matches.subcommand() {
		("detect", _) => {
			detect(&mut ee)
		},
		("read", Some(sub_m)) => {
			let address = get_address(sub_m, org)?;
			let value = ee.read(address)?;
			match org {
				Organization::Word16 => println!("{:04x}", value),
				Organization::Byte8 => println!("{:02x}", value),
			}
			Ok(())
		},
		("dump", Some(sub_m)) => {
			dump(&mut ee, sub_m)
		},
		("write", Some(sub_m)) => {
			let address = get_address(sub_m, org)?;
			let value = get_value(sub_m, org)?;
			let mut prog = ee.start_programming()?;
			prog.write(address, value)?;
			prog.finish()
		},
		("erase", Some(sub_m)) => {
			let address = get_address(sub_m, org)?;
			let mut prog = ee.start_programming()?;
			prog.erase(address)?;
			prog.finish()
		},
		("write_all", Some(sub_m)) => {
			let value = get_value(sub_m, org)?;
			let mut prog = ee.start_programming()?;
			prog.write_all(value)?;
			prog.finish()
		},
		("erase_all", _) => {
			let mut prog = ee.start_programming()?;
			prog.erase_all()?;
			prog.finish()
		},
		("program", Some(sub_m)) => {
			program(&mut ee, sub_m)
		},
		("", _) => bail!("no subcommand"),
		(cmd, _) => bail!("not implemented subcommand {:?}", cmd),
	}
}

fn main() {
	env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

	if let Err(e) = main_app() {
		error!("Error: {}", e);
		exit(1);
	}
}
