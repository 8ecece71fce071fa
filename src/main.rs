use neurascape::config::EngineConfig;
use neurascape::engine::{Engine, HostContext};
use neurascape::governor::DeviceProfile;
use neurascape::observer::EngineAdapter;
use neurascape::render::RecordingSurface;
use tracing::{info, warn};

struct Args {
    config: Option<String>,
    seconds: f64,
    width: f32,
    height: f32,
    slow_after: Option<f64>,
    nodes: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    if raw.iter().any(|a| a == "--help" || a == "-h" || a == "help") {
        print_help();
        return Ok(());
    }
    let args = parse_args(&raw)?;

    let cfg = match &args.config {
        Some(path) => {
            info!("Config file: {path}");
            EngineConfig::load(path)?
        }
        None => EngineConfig::default(),
    };
    let sections: Vec<String> = cfg.activity_centers.iter().map(|c| c.section.clone()).collect();

    let mut surface = RecordingSurface::new(args.width, args.height);
    let host = HostContext {
        device: DeviceProfile::detect("headless", available_cores(), None),
        ..HostContext::default()
    };
    let Some(mut engine) = Engine::initialize(cfg, host, Some(&surface)) else {
        warn!("engine did not start");
        return Ok(());
    };

    // Simulated 60 Hz display with a pointer sweeping the surface, a click
    // every second and a section change every three.
    let frame_ms = 1000.0 / 60.0;
    let frames = (args.seconds * 60.0).round() as u64;
    for i in 0..frames {
        let now = i as f64 * frame_ms;
        let t = now / 1000.0;
        let x = (0.5 + 0.45 * (t * 0.7).sin()) as f32 * args.width;
        let y = (0.5 + 0.45 * (t * 1.1).cos()) as f32 * args.height;
        engine.on_pointer_move(x, y);
        if i % 60 == 30 {
            engine.on_click(args.width - x, args.height - y);
        }
        if i % 180 == 0 && !sections.is_empty() {
            let idx = (i / 180) as usize % sections.len();
            engine.on_section_change(&sections[idx]);
        }

        // Pretend the host got slow part-way through.
        if let Some(after) = args.slow_after {
            if t >= after {
                engine.report_frame_time(45.0);
            }
        }
        engine.frame(now, &mut surface);
    }

    let adapter = EngineAdapter::new(&engine);
    println!("{}", serde_json::to_string_pretty(&adapter.snapshot())?);
    if args.nodes {
        println!("{}", serde_json::to_string_pretty(&adapter.nodes())?);
    }
    info!(draw_calls = surface.calls().len(), frames = surface.frames(), "done");
    Ok(())
}

fn parse_args(raw: &[String]) -> Result<Args, String> {
    let mut args = Args {
        config: None,
        seconds: 10.0,
        width: 1280.0,
        height: 720.0,
        slow_after: None,
        nodes: false,
    };
    let mut it = raw.iter();
    while let Some(a) = it.next() {
        match a.as_str() {
            "--seconds" => args.seconds = number(&mut it, a)?,
            "--width" => args.width = number(&mut it, a)? as f32,
            "--height" => args.height = number(&mut it, a)? as f32,
            "--slow-after" => args.slow_after = Some(number(&mut it, a)?),
            "--nodes" => args.nodes = true,
            s if s.starts_with("--") => return Err(format!("Unknown option: {s}")),
            s => args.config = Some(s.to_string()),
        }
    }
    Ok(args)
}

fn number<'a>(it: &mut impl Iterator<Item = &'a String>, flag: &str) -> Result<f64, String> {
    let v = it.next().ok_or_else(|| format!("{flag} needs a value"))?;
    v.parse::<f64>()
        .ok()
        .filter(|n| n.is_finite() && *n >= 0.0)
        .ok_or_else(|| format!("{flag}: not a usable number: {v}"))
}

fn available_cores() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(4)
}

fn print_help() {
    println!("neurascape (headless run of the neural background engine)");
    println!("usage:");
    println!("  cargo run -- [config.json] [options]");
    println!("options:");
    println!("  --seconds N      simulated run length (default 10)");
    println!("  --width W        surface width (default 1280)");
    println!("  --height H       surface height (default 720)");
    println!("  --slow-after T   report 45 ms frames from T seconds on");
    println!("  --nodes          also print every node");
    println!("  --help");
}
