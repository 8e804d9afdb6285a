use anyhow::Context;
use bookshelf_kernel::settings::Settings;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().with_context(|| "failed to load bookshelf settings")?;
    bookshelf_app::bootstrap::run(settings).await
}
