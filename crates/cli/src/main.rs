mod demo;

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use murmur_core::clock::TickRate;
use murmur_core::config::TalkCfg;
use murmur_core::talk::TalkService;
use murmur_core::types::{Notice, TalkEvent};
use murmur_llm::config::{self as provider_config, ProviderConfig};
use murmur_llm::gateway::AiGateway;
use murmur_llm::provider::LlmProvider;

/// Real-time frame rate of the demo loop; the host advances
/// `ticks_per_second / FRAMES_PER_SECOND` ticks per frame.
const FRAMES_PER_SECOND: u64 = 60;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Tracing: JSON to a file when RUST_LOG is set, keeping stdout for dialogue.
    if std::env::var("RUST_LOG").is_ok() {
        let file = std::fs::File::create("/tmp/murmur.log")?;
        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(fmt::layer().json().with_target(true).with_writer(file))
            .init();
    }

    let cfg = TalkCfg::from_env();
    let gateway = build_gateway(&cfg)?;
    if let Some(name) = gateway.current_provider() {
        println!("murmur: talking through provider '{name}' (ctrl-c to stop)");
    }

    let rate = speed_from_env();
    let run_for = std::env::var("MURMUR_DEMO_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|&secs| secs > 0)
        .map(Duration::from_secs);

    let (mut service, mut events) = TalkService::new(cfg, gateway, Handle::current());
    let mut village = demo::Village::new(rate);

    let token = CancellationToken::new();
    spawn_sigint_canceler(token.clone());
    if let Some(limit) = run_for {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            token.cancel();
        });
    }

    let steps = village.rate().ticks_per_second() / FRAMES_PER_SECOND;
    let mut frame = tokio::time::interval(Duration::from_millis(1000 / FRAMES_PER_SECOND));
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = frame.tick() => {
                for _ in 0..steps {
                    village.step();
                    service.advance(&village, &village);
                }
                while let Ok(event) = events.try_recv() {
                    print_event(&event);
                }
            }
        }
    }

    let records: Vec<_> = service.history().rev().take(5).collect();
    if !records.is_empty() {
        println!("\nlast requests:\n{}", serde_json::to_string_pretty(&records)?);
    }
    service.reset();
    Ok(())
}

/// `MURMUR_MOCK=1` swaps every provider for the offline canned one.
fn build_gateway(cfg: &TalkCfg) -> anyhow::Result<AiGateway> {
    let mock = std::env::var("MURMUR_MOCK").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    if mock {
        let provider = Arc::new(demo::CannedProvider) as Arc<dyn LlmProvider>;
        let config = ProviderConfig {
            kind: Some(provider_config::ProviderKind::Local),
            ..ProviderConfig::new("canned", "")
        };
        return Ok(AiGateway::with_providers(vec![(config, provider)], cfg.provider_timeout()));
    }

    let configs = provider_config::from_env();
    if configs.iter().all(|c| !c.is_valid()) {
        anyhow::bail!(
            "no valid provider configured: set MURMUR_LLM_MODEL and MURMUR_LLM_API_KEY, \
             MURMUR_PROVIDERS, or MURMUR_MOCK=1"
        );
    }
    Ok(AiGateway::new(configs, cfg.provider_timeout()))
}

fn speed_from_env() -> TickRate {
    match std::env::var("MURMUR_SPEED").as_deref() {
        Ok("fast") => TickRate::Fast,
        Ok("superfast") => TickRate::Superfast,
        Ok("ultrafast") => TickRate::Ultrafast,
        _ => TickRate::Normal,
    }
}

fn print_event(event: &TalkEvent) {
    match event {
        TalkEvent::Line(line) => {
            let marker = if line.item.is_root_reply() { "" } else { "  > " };
            println!("[{:>7}] {marker}{}: {}", line.tick, line.item.speaker_name, line.item.text);
        }
        TalkEvent::Notice(Notice::ProviderFailing { reason }) => {
            eprintln!("murmur: provider failing ({reason}); retrying quietly");
        }
        TalkEvent::Notice(Notice::NotConfigured) => {
            eprintln!("murmur: no provider configured");
        }
    }
}

fn spawn_sigint_canceler(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            if let Ok(mut sigint) =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            {
                let _ = sigint.recv().await;
                token.cancel();
            }
        }
        #[cfg(not(unix))]
        {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        }
    });
}
