const INIT: &str = include_str!("../../../sql/init.sql");

/// Schema statements in execution order.
pub fn statements() -> impl Iterator<Item = &'static str> {
	INIT.split(';').map(str::trim).filter(|statement| !statement.is_empty())
}
