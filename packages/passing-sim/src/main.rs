mod rider;
mod scenarios;
mod udp_tx;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rand::Rng;
use tracing::{info, warn};
use velotrain_core::track::{TrackModel, GATE_MPID};
use velotrain_core::Config;

use rider::Rider;
use scenarios::ScenarioConfig;
use udp_tx::UdpTransmitter;

#[derive(Debug, Parser)]
#[command(name = "passing-sim", about = "Synthetic raw-passing traffic generator")]
struct Args {
    /// Track config file, same format velotrain-server reads.
    #[arg(long, default_value = "velotrain.toml")]
    config: std::path::PathBuf,

    /// Destination for UDP raw-passing datagrams.
    #[arg(long, default_value = "127.0.0.1:2008")]
    hub_addr: String,

    /// One of: steady, isolated-slow, reorder-stress, gate-start, with-moto.
    #[arg(long, default_value = "steady")]
    scenario: String,

    /// Number of simulated riders (ignored by presets that fix their own count).
    #[arg(long, default_value_t = 6)]
    riders: usize,

    /// Seconds between synthetic decoder trigger pulses on each channel.
    #[arg(long, default_value_t = 60.0)]
    trigger_interval_secs: f64,
}

fn random_refid(rng: &mut impl Rng) -> String {
    format!("{:06}", rng.gen_range(100_000..999_999))
}

async fn trigger_loop(track: Arc<TrackModel>, tx: Arc<UdpTransmitter>, trig_refid: String, interval_secs: f64) {
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(interval_secs.max(1.0)));
    loop {
        ticker.tick().await;
        for mpid in &track.order {
            let Some(mp) = track.get(*mpid) else { continue };
            let envelope = timing_wire::WireEnvelope {
                channel: mp.channel.clone(),
                refid: trig_refid.clone(),
                unit_tod: velotrain_core::Tod::now().format_dcm(),
                env: None,
                info: None,
                low_battery: false,
            };
            tx.send(&envelope).await;
        }
    }
}

async fn rider_loop(track: Arc<TrackModel>, tx: Arc<UdpTransmitter>, mut rider: Rider) {
    let mut rng = rand::thread_rng();
    loop {
        let (mpid, delay) = rider.advance(&track, &mut rng);
        tokio::time::sleep(delay).await;
        let Some(mp) = track.get(mpid) else { continue };
        let envelope = timing_wire::WireEnvelope {
            channel: mp.channel.clone(),
            refid: rider.refid.clone(),
            unit_tod: velotrain_core::Tod::now().format_dcm(),
            env: Some([rng.gen_range(-0.2..0.2), rng.gen_range(-0.2..0.2), 1.0]),
            info: None,
            low_battery: false,
        };
        tx.send(&envelope).await;
    }
}

async fn gate_start(track: Arc<TrackModel>, tx: Arc<UdpTransmitter>, gate_channel: String, refid: String) {
    tokio::time::sleep(Duration::from_secs(3)).await;
    let _ = track.get(GATE_MPID);
    let envelope = timing_wire::WireEnvelope {
        channel: gate_channel,
        refid,
        unit_tod: velotrain_core::Tod::now().format_dcm(),
        env: None,
        info: Some("gate-start".into()),
        low_battery: false,
    };
    tx.send(&envelope).await;
    info!("gate start sent");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "passing_sim=info".into()),
        )
        .init();

    let args = Args::parse();

    let cfg: Config = if args.config.exists() {
        let raw = std::fs::read_to_string(&args.config)?;
        toml::from_str(&raw)?
    } else {
        warn!(path = %args.config.display(), "config file not found, using defaults");
        Config::default()
    };

    let track = Arc::new(TrackModel::build(cfg.laplen, &cfg.mpseq, &cfg.mps)?);
    let tx = Arc::new(UdpTransmitter::bind(args.hub_addr.clone()).await?);

    let Some(scenario) = ScenarioConfig::from_name(&args.scenario, args.riders) else {
        anyhow::bail!("unknown scenario {}", args.scenario);
    };
    info!(scenario = %args.scenario, riders = scenario.rider_count, "starting traffic generator");

    let mut rng = rand::thread_rng();
    let mut tasks = Vec::new();

    tasks.push(tokio::spawn(trigger_loop(track.clone(), tx.clone(), cfg.trig.clone(), args.trigger_interval_secs)));

    for _ in 0..scenario.rider_count {
        let rider = Rider::new(random_refid(&mut rng), scenario.base_speed_kmh, scenario.jitter_stddev_kmh);
        tasks.push(tokio::spawn(rider_loop(track.clone(), tx.clone(), rider)));
    }

    if scenario.include_moto {
        let moto_refid = cfg.moto.first().cloned().unwrap_or_else(|| random_refid(&mut rng));
        let moto = Rider::new(moto_refid, scenario.base_speed_kmh + 2.0, scenario.jitter_stddev_kmh);
        tasks.push(tokio::spawn(rider_loop(track.clone(), tx.clone(), moto)));
    }

    if scenario.include_gate_start {
        if let Some(gate_channel) = cfg.gatesrc.clone() {
            let refid = cfg.gate.clone().unwrap_or_else(|| random_refid(&mut rng));
            tasks.push(tokio::spawn(gate_start(track.clone(), tx.clone(), gate_channel, refid)));
        } else {
            warn!("scenario requests a gate start but no gatesrc is configured, skipping");
        }
    }

    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}
