use anyhow::{Result, anyhow};
use log::warn;
use pico_args::Arguments;
use rand::SeedableRng;
use rand::rngs::StdRng;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::{
    env,
    io::{self, BufWriter},
    path::PathBuf,
    sync::{Arc, atomic::AtomicBool},
};

use crate::config::ConfigState;
use crate::geometry::{self, GiftBuffers, ParticleBuffers};
use crate::gestures::{DEFAULT_WINDOW, Gesture, GestureDebouncer, classify};
use crate::landmarks::HandPose;
use crate::scene::Scene;
use crate::session::{self, RunOptions, RunSummary, observe_frame};
use crate::sink::{JsonLinesSink, LogSink};
use crate::source::{LandmarkSource, ReplaySource, SyntheticSource};

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // No args -> general help
    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    // Flags-based help (-h/--help)
    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    // First free arg is the subcommand
    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            if let Some(t) = topic {
                print_subcmd_help(&t);
            } else {
                print_help();
            }
            Ok(())
        }

        Some("run") => cmd_run(pargs),
        Some("geometry") => cmd_geometry(pargs),
        Some("classify") => cmd_classify(pargs),

        Some("list") => {
            let st = ConfigState::load_or_install_default()?;
            for name in st.list_profiles() {
                let mark = if name == st.active_name { '*' } else { ' ' };
                println!("{mark} {name}");
            }
            Ok(())
        }

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: magictree use <profile_name>"))?;
            let mut st = ConfigState::load_or_install_default()?;
            st.set_active(&name)?;
            println!("ok: active profile is now '{}'", st.active_name);
            Ok(())
        }

        Some("doctor") => {
            let st = ConfigState::load_or_install_default()?;
            print_response(&st.doctor_report());
            Ok(())
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

fn cmd_run(mut pargs: Arguments) -> Result<()> {
    let profile_name: Option<String> = pargs.opt_value_from_str("--profile")?;
    let replay: Option<PathBuf> = pargs.opt_value_from_str("--replay")?;
    let frames: Option<u64> = pargs.opt_value_from_str("--frames")?;
    let json = pargs.contains("--json");
    let paced = !pargs.contains("--no-pace");
    let watch = !pargs.contains("--no-watch");
    reject_leftovers(pargs)?;

    let mut state = ConfigState::load_or_install_default()?;
    if let Some(name) = profile_name {
        state.select(&name)?;
    }
    let profile = state.profile.clone();

    let source: Box<dyn LandmarkSource> = match replay {
        Some(path) => Box::new(ReplaySource::open(&path, paced)?),
        None if !paced && frames.is_none() => {
            return Err(anyhow!("--no-pace with the built-in demo needs --frames"));
        }
        None => Box::new(SyntheticSource::demo().paced(paced)),
    };

    let stop = Arc::new(AtomicBool::new(false));
    for sig in [SIGINT, SIGTERM] {
        signal_hook::flag::register(sig, Arc::clone(&stop))?;
    }

    let reloader = if watch {
        state
            .watch()
            .map_err(|e| warn!("profile hot reload disabled: {e}"))
            .ok()
    } else {
        None
    };

    let opts = RunOptions {
        max_frames: frames,
        paced,
        ..RunOptions::default()
    };

    if json {
        let mut sink = JsonLinesSink::new(BufWriter::new(io::stdout()));
        session::run(&profile, source, &mut sink, opts, reloader, stop)?;
    } else {
        let mut sink = LogSink::new(u64::from(profile.animation.fps));
        let summary = session::run(&profile, source, &mut sink, opts, reloader, stop)?;
        print_summary(&summary);
    }
    Ok(())
}

fn cmd_geometry(mut pargs: Arguments) -> Result<()> {
    let count: i64 = pargs
        .opt_value_from_str("--count")?
        .unwrap_or(geometry::DEFAULT_PARTICLE_COUNT as i64);
    let gifts: i64 = pargs
        .opt_value_from_str("--gifts")?
        .unwrap_or(geometry::DEFAULT_GIFT_COUNT as i64);
    let seed: Option<u64> = pargs.opt_value_from_str("--seed")?;
    let json = pargs.contains("--json");
    reject_leftovers(pargs)?;

    let count = geometry::checked_count(count)?;
    let gifts = geometry::checked_count(gifts)?;
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    let scene = Scene::generate(count, gifts, &mut rng);

    if json {
        print_response(&serde_json::json!({
            "particles": ParticleBuffers::from_records(&scene.particles),
            "gifts": GiftBuffers::from_records(&scene.gifts),
        }));
        return Ok(());
    }

    let mut lo = [f32::INFINITY; 3];
    let mut hi = [f32::NEG_INFINITY; 3];
    for p in &scene.particles {
        for k in 0..3 {
            lo[k] = lo[k].min(p.position[k]);
            hi[k] = hi[k].max(p.position[k]);
        }
    }
    println!("particles: {} (star + {count})", scene.particles.len());
    println!("ornaments: {:.1}%", scene.ornament_share() * 100.0);
    println!("gifts:     {}", scene.gifts.len());
    println!(
        "bounds:    x [{:.2}, {:.2}]  y [{:.2}, {:.2}]  z [{:.2}, {:.2}]",
        lo[0], hi[0], lo[1], hi[1], lo[2], hi[2]
    );
    Ok(())
}

fn cmd_classify(mut pargs: Arguments) -> Result<()> {
    let window: usize = pargs
        .opt_value_from_str("--window")?
        .unwrap_or(DEFAULT_WINDOW);
    let path: PathBuf = pargs
        .free_from_str()
        .map_err(|_| anyhow!("usage: magictree classify <file.jsonl>"))?;
    reject_leftovers(pargs)?;

    let mut source = ReplaySource::open(&path, false)?;
    let mut debouncer = GestureDebouncer::new(window.max(1));
    while let Some(frame) = source.next_frame() {
        let label = match &frame.hand {
            None => "absent".to_string(),
            Some(points) => match HandPose::from_points(points) {
                Ok(pose) => classify(&pose).to_string(),
                Err(e) => format!("rejected ({e})"),
            },
        };
        let stable = match observe_frame(&mut debouncer, &frame) {
            Ok(d) if d.changed => format!("{} *", d.stable),
            Ok(d) => d.stable.to_string(),
            Err(_) => debouncer.stable().to_string(),
        };
        println!("{:>8} ms  {label:<24} {stable}", frame.timestamp_ms);
    }
    Ok(())
}

fn reject_leftovers(pargs: Arguments) -> Result<()> {
    let rest = pargs.finish();
    if rest.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("unexpected arguments: {rest:?}"))
    }
}

fn print_summary(s: &RunSummary) {
    let p = &s.final_params;
    println!(
        "frames={} changes={} rejected={} gesture={}",
        s.frames, s.gesture_changes, s.rejected_frames, s.final_gesture
    );
    println!(
        "expansion={:+.3} speed={:.3} verticalFlow={:.3} disco={:.3}",
        p.expansion, p.speed, p.vertical_flow, p.disco
    );
}

fn print_help() {
    let gestures: Vec<&str> = Gesture::ALL.iter().map(Gesture::as_str).collect();
    println!(
        r#"magictree - gesture-driven particle tree

USAGE:
  magictree help [command]            Show general or command-specific help
  magictree run [options]             Run a session (demo hand unless --replay)
  magictree geometry [options]        Generate a tree and print its stats
  magictree classify <file.jsonl>     Label every frame of a landmark capture
  magictree list                      List profiles
  magictree use <name>                Switch active profile
  magictree doctor                    Show config paths and active settings

GESTURES: {}

TIPS:
  - Profiles: ~/.config/magictree/profiles
  - Active profile pointer: ~/.config/magictree/active
  - RUST_LOG=debug shows per-frame output
"#,
        gestures.join(", ")
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "run" => println!(
            "usage: magictree run [--profile NAME] [--replay FILE] [--frames N] [--json] [--no-pace] [--no-watch]\n\
             Runs the inference and render loops until the source ends, N frames or Ctrl-C.\n\
             --json writes scene/gesture/frame events to stdout as JSON lines."
        ),
        "geometry" => println!(
            "usage: magictree geometry [--count N] [--gifts N] [--seed S] [--json]\n\
             Prints particle counts, ornament share and bounds, or the flat attribute buffers."
        ),
        "classify" => println!(
            "usage: magictree classify [--window N] <file.jsonl>\n\
             Prints the per-frame label and the debounced gesture; '*' marks a change."
        ),
        "list" => {
            println!("usage: magictree list\nLists available profiles; marks active with '*'.")
        }
        "use" => println!("usage: magictree use <name>\nSwitches the active profile to <name>."),
        "doctor" => println!(
            "usage: magictree doctor\nPrints config paths, the active profile and its settings."
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_response(v: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}
