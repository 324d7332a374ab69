use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::*;
use seqgif::encoder::{install_hint, EncoderInfo};
use seqgif::analysis::collect_frame_paths;
use seqgif::{ConversionParams, SequenceAnalysis, SequenceDescriptor, Session, Settings};
use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Instant;

fn cli() -> Command {
    Command::new("seqgif")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Turn a numbered PNG sequence into an animated GIF")
        .arg(
            Arg::new("paths")
                .value_name("PATH")
                .help("Frame files or a directory containing them")
                .num_args(1..)
                .required_unless_present("check"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Output GIF (default: <prefix>_animated.gif next to the frames)"),
        )
        .arg(
            Arg::new("fps")
                .short('r')
                .long("fps")
                .value_name("RATE")
                .help("Frames per second (1 to 120)"),
        )
        .arg(
            Arg::new("width")
                .short('w')
                .long("width")
                .value_name("PIXELS")
                .help("Output width; height keeps the aspect ratio"),
        )
        .arg(
            Arg::new("loop")
                .long("loop")
                .help("Loop the animation forever")
                .action(ArgAction::SetTrue)
                .conflicts_with("no-loop"),
        )
        .arg(
            Arg::new("no-loop")
                .long("no-loop")
                .help("Play the animation once instead of looping")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("analyze")
                .long("analyze")
                .help("Only report the detected sequence")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print the analysis as JSON")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("check")
                .long("check")
                .help("Report whether ffmpeg is installed and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("More log output (-v info, -vv debug)")
                .action(ArgAction::Count),
        )
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn parse_arg<T: FromStr>(matches: &ArgMatches, name: &str) -> Result<Option<T>, Box<dyn Error>> {
    matches
        .get_one::<String>(name)
        .map(|s| s.parse::<T>())
        .transpose()
        .map_err(|_| format!("Invalid {} value", name).into())
}

/// `--loop` and `--no-loop` override the saved setting either way.
fn loop_setting(matches: &ArgMatches, saved: bool) -> bool {
    if matches.get_flag("loop") {
        true
    } else if matches.get_flag("no-loop") {
        false
    } else {
        saved
    }
}

fn error_line(error: &dyn Error) -> String {
    format!("{} {}", "Error:".bold().red(), error)
}

fn print_encoder_status(info: &EncoderInfo) {
    match (&info.path, info.installed) {
        (Some(path), true) => {
            println!("{} {}", "ffmpeg found:".bold().green(), path.display());
            if let Some(version) = &info.version {
                println!("  {}: {}", "Version".green(), version);
            }
        }
        _ => {
            println!("{}", "ffmpeg not found".bold().red());
            println!("  {}", install_hint());
        }
    }
}

fn print_analysis(analysis: &SequenceAnalysis, descriptor: Option<&SequenceDescriptor>) {
    match (analysis, descriptor) {
        (SequenceAnalysis::Valid { pattern, frame_count, directory, .. }, Some(descriptor)) => {
            println!("{} {}", "Found sequence".bold().blue(), pattern);
            println!(
                "  {}: {} ({} to {})",
                "Frames".green(),
                frame_count,
                descriptor.start_number(),
                descriptor.end_number()
            );
            println!("  {}: {}", "Directory".green(), directory);
            let gaps = descriptor.gaps();
            if !gaps.is_empty() {
                let shown: Vec<String> = gaps
                    .iter()
                    .take(5)
                    .map(|gap| {
                        if gap.start() == gap.end() {
                            gap.start().to_string()
                        } else {
                            format!("{}-{}", gap.start(), gap.end())
                        }
                    })
                    .collect();
                let more = if gaps.len() > shown.len() { ", ..." } else { "" };
                println!(
                    "  {}: {} frame number(s) skipped ({}{})",
                    "Gaps".yellow(),
                    descriptor.skipped_count(),
                    shown.join(", "),
                    more
                );
            }
        }
        _ => {
            if let Some(error) = analysis.error() {
                eprintln!("{} {}", "Not a sequence:".bold().red(), error);
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();
    init_logging(matches.get_count("verbose"));

    match run(&matches).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", error_line(e.as_ref()));
            ExitCode::FAILURE
        }
    }
}

async fn run(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let settings = Settings::load();
    let mut session = Session::from_settings(&settings);

    if matches.get_flag("check") {
        let info = session.encoder_info();
        print_encoder_status(&info);
        if !info.installed {
            return Err("ffmpeg is not installed".into());
        }
        return Ok(());
    }

    let inputs: Vec<&String> = matches
        .get_many::<String>("paths")
        .map(|values| values.collect())
        .unwrap_or_default();
    let paths = collect_frame_paths(session.matcher(), inputs)?;

    let analysis = session.analyze(paths);
    if matches.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
    } else {
        print_analysis(&analysis, session.descriptor());
    }
    let Some(descriptor) = session.descriptor() else {
        return Err(analysis.error().unwrap_or("Not an image sequence").to_string().into());
    };
    if matches.get_flag("analyze") || matches.get_flag("json") {
        return Ok(());
    }

    let info = session.encoder_info();
    if !info.installed {
        print_encoder_status(&info);
        return Err("ffmpeg is required to create GIFs".into());
    }

    let framerate = parse_arg::<u32>(matches, "fps")?.unwrap_or(settings.defaults.framerate);
    let width = parse_arg::<u32>(matches, "width")?.unwrap_or(settings.defaults.width);
    let loop_forever = loop_setting(matches, settings.defaults.loop_forever);
    let output_path = matches
        .get_one::<String>("output")
        .map(PathBuf::from)
        .unwrap_or_else(|| descriptor.default_output_path(&settings.output_extension));
    let total_frames = descriptor.frame_count();

    println!("{}", "Converting with settings:".bold().cyan());
    println!("  {}: {} fps", "Framerate".green(), framerate);
    println!("  {}: {} px", "Width".green(), width);
    println!("  {}: {}", "Loop".green(), if loop_forever { "forever" } else { "once" });
    println!("  {}: {}", "Output".yellow(), output_path.display());

    let start_time = Instant::now();
    let running = session.start_conversion(ConversionParams {
        framerate,
        width,
        loop_forever,
        output_path,
    })?;

    let mut handle = running.handle().clone();
    loop {
        tokio::select! {
            changed = handle.changed() => match changed {
                Some(snapshot) => {
                    if let Some(progress) = snapshot.progress {
                        print!(
                            "\r{} frame {}/{} ({:.0}%)",
                            "Encoding".yellow(),
                            progress.frame_index.min(total_frames as u64),
                            total_frames,
                            progress.percent
                        );
                        io::stdout().flush()?;
                    }
                    if snapshot.state.is_terminal() {
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("\n{}", "Cancelling...".yellow());
                running.cancel();
            }
        }
    }
    println!();

    let snapshot = running.wait().await;
    match snapshot.outcome {
        Some(Ok(path)) => {
            println!("{}: {}", "GIF created successfully".bold().green(), path.display());
            println!(
                "{}: {:.2} seconds at {} fps",
                "Animation length".blue(),
                total_frames as f32 / framerate as f32,
                framerate
            );
            println!("{}: {:.2?}", "Processing time".blue(), start_time.elapsed());
            Ok(())
        }
        Some(Err(e)) => Err(e.into()),
        None => Err("Conversion ended without a result".into()),
    }
}
