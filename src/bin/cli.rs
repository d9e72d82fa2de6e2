use clap::{App, Arg, SubCommand};
use sensorcast::{
    camera::CameraId,
    depth::DepthRange,
    error::CaptureError,
    intrinsics::CameraIntrinsics,
    pipeline::CapturePipeline,
    publish::LogTransport,
    synthetic::SyntheticSurface,
    PipelineConfig, Result,
};
use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

fn main() -> Result<()> {
    env_logger::init();

    let matches = App::new("sensorcast-cli")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Sensorcast capture pipeline CLI Tool")
        .subcommand(
            SubCommand::with_name("run")
                .about("Drive the pipeline against a synthetic render surface")
                .arg(
                    Arg::with_name("config")
                        .short("c")
                        .long("config")
                        .value_name("FILE")
                        .help("TOML pipeline configuration")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("cameras")
                        .short("n")
                        .long("cameras")
                        .value_name("COUNT")
                        .help("Number of synthetic cameras when no config names any")
                        .default_value("2"),
                )
                .arg(
                    Arg::with_name("width")
                        .long("width")
                        .value_name("PIXELS")
                        .help("Synthetic camera width")
                        .default_value("320"),
                )
                .arg(
                    Arg::with_name("height")
                        .long("height")
                        .value_name("PIXELS")
                        .help("Synthetic camera height")
                        .default_value("240"),
                )
                .arg(
                    Arg::with_name("duration")
                        .short("d")
                        .long("duration")
                        .value_name("SECONDS")
                        .help("How long to run")
                        .default_value("2"),
                )
                .arg(
                    Arg::with_name("fps")
                        .long("fps")
                        .value_name("HZ")
                        .help("Render loop rate")
                        .default_value("60"),
                ),
        )
        .subcommand(
            SubCommand::with_name("intrinsics")
                .about("Print the pinhole calibration for a camera")
                .arg(
                    Arg::with_name("fov")
                        .long("fov")
                        .value_name("DEGREES")
                        .help("Vertical field of view")
                        .default_value("60"),
                )
                .arg(
                    Arg::with_name("width")
                        .long("width")
                        .value_name("PIXELS")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("height")
                        .long("height")
                        .value_name("PIXELS")
                        .required(true)
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("linearize")
                .about("Convert one raw depth sample into a distance")
                .arg(
                    Arg::with_name("raw")
                        .help("Raw depth value in [0, 1]")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::with_name("near")
                        .long("near")
                        .value_name("METRES")
                        .default_value("0.1"),
                )
                .arg(
                    Arg::with_name("far")
                        .long("far")
                        .value_name("METRES")
                        .default_value("100"),
                )
                .arg(
                    Arg::with_name("standard")
                        .long("standard")
                        .help("Depth buffer is not reversed (0 at the near plane)"),
                ),
        )
        .subcommand(SubCommand::with_name("info").about("Show version information"))
        .get_matches();

    match matches.subcommand() {
        ("run", Some(run_matches)) => handle_run(run_matches),
        ("intrinsics", Some(k_matches)) => handle_intrinsics(k_matches),
        ("linearize", Some(lin_matches)) => handle_linearize(lin_matches),
        ("info", Some(_)) => show_info(),
        _ => {
            println!("Use --help for usage information");
            Ok(())
        }
    }
}

fn parse<T: std::str::FromStr>(matches: &clap::ArgMatches, name: &str) -> Result<T> {
    matches
        .value_of(name)
        .ok_or_else(|| CaptureError::invalid_parameter(name, "Missing value"))?
        .parse()
        .map_err(|_| CaptureError::invalid_parameter(name, "Invalid number format"))
}

fn handle_run(matches: &clap::ArgMatches) -> Result<()> {
    let config = match matches.value_of("config") {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    let width: u32 = parse(matches, "width")?;
    let height: u32 = parse(matches, "height")?;
    let seconds: f64 = parse(matches, "duration")?;
    let fps: f64 = parse(matches, "fps")?;
    if !(fps > 0.0) {
        return Err(CaptureError::invalid_parameter("fps", "Rate must be positive"));
    }

    let surface = Arc::new(SyntheticSurface::new());
    let names: Vec<String> = if config.cameras.is_empty() {
        let count: u32 = parse(matches, "cameras")?;
        (0..count).map(|i| format!("cam{}", i)).collect()
    } else {
        config.cameras.iter().map(|c| c.name.clone()).collect()
    };
    for (i, name) in names.iter().enumerate() {
        surface.add_camera(CameraId(i as u32 + 1), name.as_str(), width, height);
    }

    let transport = Arc::new(LogTransport::new());
    let mut pipeline = CapturePipeline::new(config, surface.clone(), transport.clone())?;
    let registered = pipeline.register_active_cameras()?;

    println!("Running {} cameras at {}x{} for {:.1}s", registered.len(), width, height, seconds);

    let frame = Duration::from_secs_f64(1.0 / fps);
    let deadline = Instant::now() + Duration::from_secs_f64(seconds);
    let mut dispatched = 0;
    let mut skipped = 0;
    while Instant::now() < deadline {
        surface.render_frame();
        let report = pipeline.tick(Instant::now());
        dispatched += report.dispatched;
        skipped += report.backpressure + report.pending;
        thread::sleep(frame);
    }

    pipeline.shutdown();
    let stats = pipeline.stats();

    println!("\nResults:");
    println!("  Capture cycles: {}", dispatched);
    println!("  Skipped (backpressure/pending): {}", skipped);
    println!("  Messages published: {}", transport.messages());
    println!("  Bytes published: {}", transport.bytes());
    println!("  Publish failures: {}", stats.publish_failures);
    println!("  Frames dropped: {}", stats.readback.dropped_frames());
    println!("  Byte pool: {}", stats.byte_pool.summary());
    println!("  Float pool: {}", stats.float_pool.summary());
    println!("  Peak queue length: {}", stats.peak_queue_len);
    Ok(())
}

fn handle_intrinsics(matches: &clap::ArgMatches) -> Result<()> {
    let fov: f64 = parse(matches, "fov")?;
    let width: u32 = parse(matches, "width")?;
    let height: u32 = parse(matches, "height")?;

    let k = CameraIntrinsics::for_resolution(fov, width, height);
    println!("Resolution: {}x{}", k.width, k.height);
    println!("Horizontal FOV: {:.3} deg", k.fov_x_deg());
    println!("K:");
    for row in k.k.chunks(3) {
        println!("  [{:>12.4} {:>12.4} {:>12.4}]", row[0], row[1], row[2]);
    }
    println!("P:");
    for row in k.p.chunks(4) {
        println!(
            "  [{:>12.4} {:>12.4} {:>12.4} {:>12.4}]",
            row[0], row[1], row[2], row[3]
        );
    }
    println!("Distortion: {} {:?}", k.distortion_model, k.d);
    Ok(())
}

fn handle_linearize(matches: &clap::ArgMatches) -> Result<()> {
    let raw: f32 = parse(matches, "raw")?;
    let near: f32 = parse(matches, "near")?;
    let far: f32 = parse(matches, "far")?;
    let range = DepthRange::new(near, far, !matches.is_present("standard"))?;

    println!("{}", range.linearize(raw));
    Ok(())
}

fn show_info() -> Result<()> {
    println!("Sensorcast Capture Pipeline");
    println!("Version: {}", sensorcast::VERSION);
    println!("Default workers: {}", sensorcast::config::DEFAULT_WORKER_COUNT);
    println!("Default queue limit: {}", sensorcast::config::DEFAULT_MAX_QUEUE_LEN);
    Ok(())
}
