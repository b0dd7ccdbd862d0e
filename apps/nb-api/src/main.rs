use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = nb_api::Args::parse();

	nb_api::run(args).await
}
