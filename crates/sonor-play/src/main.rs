//! Headless song player for the sonor engine.
//!
//! Loads a song file, registers its ensemble, then either drives the live
//! audio stream from a tick-accurate control loop or renders the song
//! offline to a WAV file.
//!
//! ## Usage
//!
//! ```text
//! sonor-play song.yaml                 # play live on the default device
//! sonor-play song.yaml --render out.wav
//! sonor-play song.yaml --tail 3.0      # seconds to let releases ring out
//! sonor-play song.yaml --seed 7        # deterministic note generators
//! ```

mod notes;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use crossbeam::channel;

use sonor_core::audio::AudioConfig;
use sonor_core::config::{load_song, SongConfig};
use sonor_core::engine::EngineHandle;
use sonor_core::types::{MonoBuffer, DEFAULT_RENDER_BLOCK};

use crate::notes::{NoteSource, RandomScale, ScriptedSteps};

struct Args {
    song: PathBuf,
    render: Option<PathBuf>,
    tail_secs: f32,
    seed: Option<u64>,
}

fn parse_args() -> Result<Args> {
    let mut args = std::env::args().skip(1);
    let mut song = None;
    let mut render = None;
    let mut tail_secs = 2.0;
    let mut seed = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--render" => {
                let path = args.next().context("--render needs an output path")?;
                render = Some(PathBuf::from(path));
            }
            "--tail" => {
                let secs = args.next().context("--tail needs a value in seconds")?;
                tail_secs = secs.parse().context("--tail value must be a number")?;
            }
            "--seed" => {
                let value = args.next().context("--seed needs a value")?;
                seed = Some(value.parse().context("--seed value must be an integer")?);
            }
            "--help" | "-h" => {
                println!(
                    "usage: sonor-play <song.yaml> [--render out.wav] [--tail seconds] [--seed n]"
                );
                std::process::exit(0);
            }
            other if song.is_none() => song = Some(PathBuf::from(other)),
            other => bail!("unexpected argument '{other}'"),
        }
    }

    Ok(Args {
        song: song.context("missing song file; usage: sonor-play <song.yaml>")?,
        render,
        tail_secs,
        seed,
    })
}

/// Everything that happens on one tick of the song grid. Note ends are
/// applied before note starts so a re-struck voice retriggers instead of
/// being cut off by its own previous note.
#[derive(Default)]
struct TickEvents {
    note_offs: Vec<String>,
    note_ons: Vec<(String, u8, f32)>,
    controls: Vec<(String, f32)>,
}

fn place_note(schedule: &mut [TickEvents], tick: u32, event: &notes::NoteEvent) {
    let end = (schedule.len() - 1) as u32;
    schedule[tick.min(end) as usize].note_ons.push((
        event.voice.clone(),
        event.note,
        event.velocity,
    ));
    let off = (tick + event.length).min(end);
    schedule[off as usize].note_offs.push(event.voice.clone());
}

/// Resolve the song into one absolute tick grid: flat steps and automation
/// first, then each part span with its scripted steps and generators.
/// Generator state persists across a part's repeats, so every pass rolls
/// fresh notes; a seed makes the whole arrangement reproducible.
fn build_schedule(song: &SongConfig, seed: Option<u64>) -> Vec<TickEvents> {
    let end = song.end_tick() as usize;
    let mut schedule: Vec<TickEvents> = (0..=end).map(|_| TickEvents::default()).collect();

    let mut flat = ScriptedSteps::new(&song.steps);
    for tick in 0..=end as u32 {
        for event in flat.notes_at(tick) {
            place_note(&mut schedule, tick, &event);
        }
    }
    for auto in &song.automation {
        schedule[auto.tick as usize]
            .controls
            .push((auto.control.clone(), auto.value));
    }

    // One source set per part, shared by all of that part's spans.
    let mut sources: Vec<Vec<Box<dyn NoteSource>>> = song
        .parts
        .iter()
        .enumerate()
        .map(|(i, part)| {
            let mut list: Vec<Box<dyn NoteSource>> =
                vec![Box::new(ScriptedSteps::new(&part.steps))];
            for (j, generator) in part.generators.iter().enumerate() {
                list.push(match seed {
                    Some(seed) => Box::new(RandomScale::seeded(
                        generator,
                        seed ^ (((i as u64) << 32) | j as u64),
                    )),
                    None => Box::new(RandomScale::new(generator)),
                });
            }
            list
        })
        .collect();

    for span in song.timeline() {
        let part = &song.parts[span.part];
        for local in 0..part.length {
            for source in &mut sources[span.part] {
                for event in source.notes_at(local) {
                    place_note(&mut schedule, span.start_tick + local, &event);
                }
            }
        }
        for auto in &part.automation {
            schedule[(span.start_tick + auto.tick).min(end as u32) as usize]
                .controls
                .push((auto.control.clone(), auto.value));
        }
    }

    schedule
}

fn apply_tick(handle: &EngineHandle, events: &TickEvents) {
    for voice in &events.note_offs {
        handle.note_off(voice);
    }
    for (voice, note, velocity) in &events.note_ons {
        handle.note_on(voice, *note, *velocity);
    }
    for (control, value) in &events.controls {
        handle.update_control(control, *value);
    }
}

fn setup_engine(song: &SongConfig, handle: &mut EngineHandle) -> Result<()> {
    // Registration order is alphabetical so mix order is stable run to run.
    let mut names: Vec<&String> = song.voices.keys().collect();
    names.sort();
    for name in names {
        handle
            .register_voice(&song.voices[name], Some(name))
            .with_context(|| format!("registering voice '{name}'"))?;
    }
    for link in &song.links {
        handle.link(&link.control, &link.voice, &link.param);
    }
    Ok(())
}

fn play_live(song: &SongConfig, handle: &mut EngineHandle, args: &Args) -> Result<()> {
    let (stop_tx, stop_rx) = channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .context("installing ctrl-c handler")?;

    handle.start(&AudioConfig::default())?;
    log::info!(
        "playing at {} bpm, {} ticks, {:.1}ms per tick",
        song.bpm,
        song.end_tick() + 1,
        song.tick_interval_secs() * 1000.0
    );

    let schedule = build_schedule(song, args.seed);
    let interval = Duration::from_secs_f32(song.tick_interval_secs());
    let start = Instant::now();

    for (tick, events) in schedule.iter().enumerate() {
        let deadline = start + interval * tick as u32;
        let now = Instant::now();
        if now < deadline {
            std::thread::sleep(deadline - now);
        } else if now > deadline + interval {
            log::warn!("control loop overran tick {tick} by {:?}", now - deadline);
        }
        if stop_rx.try_recv().is_ok() {
            log::info!("interrupted, stopping");
            break;
        }
        apply_tick(handle, events);
    }

    // Let releases ring out before pausing the stream.
    std::thread::sleep(Duration::from_secs_f32(args.tail_secs));
    handle.stop()?;
    Ok(())
}

fn render_to_wav(
    song: &SongConfig,
    handle: &mut EngineHandle,
    out: &PathBuf,
    args: &Args,
) -> Result<()> {
    let sample_rate = handle.sample_rate();
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: sample_rate as u32,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer =
        hound::WavWriter::create(out, spec).with_context(|| format!("creating {out:?}"))?;

    let schedule = build_schedule(song, args.seed);
    let samples_per_tick = (song.tick_interval_secs() * sample_rate).round() as usize;
    let tail_samples = (args.tail_secs * sample_rate) as usize;
    let mut block = MonoBuffer::with_capacity(DEFAULT_RENDER_BLOCK);

    let mut render = |handle: &mut EngineHandle,
                      writer: &mut hound::WavWriter<_>,
                      mut remaining: usize|
     -> Result<()> {
        while remaining > 0 {
            let n = remaining.min(DEFAULT_RENDER_BLOCK);
            block.set_len(n);
            handle.render_offline(block.as_mut_slice());
            for &s in block.as_slice() {
                writer.write_sample(s)?;
            }
            remaining -= n;
        }
        Ok(())
    };

    for events in &schedule {
        apply_tick(handle, events);
        render(handle, &mut writer, samples_per_tick)?;
    }
    render(handle, &mut writer, tail_samples)?;

    writer.finalize().context("finalizing WAV file")?;
    log::info!("wrote {out:?}");
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args()?;
    let song = load_song(&args.song).with_context(|| format!("loading {:?}", args.song))?;
    log::info!(
        "loaded song: {} voices, {} steps, {} bpm",
        song.voices.len(),
        song.steps.len(),
        song.bpm
    );

    let mut handle = EngineHandle::new();
    setup_engine(&song, &mut handle)?;

    match &args.render {
        Some(out) => render_to_wav(&song, &mut handle, out, &args)?,
        None => play_live(&song, &mut handle, &args)?,
    }

    Ok(())
}
