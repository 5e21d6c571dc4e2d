fn main() -> anyhow::Result<()> {
	authservice_app::run()
}
