use clap::builder::{
	Styles,
	styling::{AnsiColor, Effects},
};

/// Version string shared by every NoteBuddy binary: `<pkg>-<git sha>-<target triple>`.
pub const VERSION: &str = concat!(
	env!("CARGO_PKG_VERSION"),
	"-",
	env!("VERGEN_GIT_SHA"),
	"-",
	env!("VERGEN_CARGO_TARGET_TRIPLE"),
);

pub fn styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Green.on_default() | Effects::BOLD)
		.usage(AnsiColor::Green.on_default() | Effects::BOLD)
		.literal(AnsiColor::Cyan.on_default() | Effects::BOLD)
		.placeholder(AnsiColor::Yellow.on_default())
}
