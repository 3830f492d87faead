use anyhow::Result;

use multifx::AudioEngine;

fn main() -> Result<()> {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

  let mut engine = AudioEngine::new()?;
  engine.start()?;
  log::info!("engine running at {} Hz; ctrl-c to quit", engine.sr);

  loop {
    std::thread::park();
  }
}
