use std::{error::Error, thread, time::Duration};

use audio_engine::{
    config::EngineConfig,
    device_manager::{AudioDeviceManager, cpal_dm::CpalAudioDeviceManager},
    mixer::Mixer,
    reader::{Reader, sine::SineReader, wav::WavStreamReader},
    voice::Voice,
};
use log::info;

const REPORT_INTERVAL: Duration = Duration::from_millis(500);

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let mut manager = CpalAudioDeviceManager::new();
    let format = manager.output_format()?;
    let config = EngineConfig::new(format.channels, format.sample_rate);

    // play the wav given on the command line, or a test tone
    let (reader, seconds): (Box<dyn Reader>, u64) = match std::env::args().nth(1) {
        Some(path) => {
            let reader = WavStreamReader::from_file(&path)?;
            let seconds = reader.duration() as u64 / u64::from(reader.sample_rate()).max(1) + 1;
            info!("playing {path} ({} channels)", reader.channels());
            (Box::new(reader), seconds)
        }
        None => {
            info!("no file given, playing a 440 Hz tone");
            let reader = SineReader::new(440.0, 1, format.sample_rate).with_amplitude(0.2);
            (Box::new(reader), 5)
        }
    };
    let sample_rate = i64::from(reader.sample_rate());

    let (mixer, mut mixer_handle) = Mixer::new(config);
    let (voice, decoder) = Voice::open(reader, &config);
    let positions = voice.positions();
    mixer_handle.add_voice(voice)?;

    let decoder = decoder.spawn()?;
    manager.start_output_stream(Box::new(mixer))?;

    let reports = seconds * 1000 / REPORT_INTERVAL.as_millis() as u64;
    for report in 1..=reports {
        thread::sleep(REPORT_INTERVAL);
        let source_frame = report as i64 * REPORT_INTERVAL.as_millis() as i64 * sample_rate / 1000;
        let position = positions.snapshot().search(source_frame);
        info!(
            "source frame {source_frame} -> output frame {}{}",
            position.dest_frame,
            if position.approximate { " (approximate)" } else { "" }
        );
        mixer_handle.reclaim();
        if !decoder.is_running() {
            break;
        }
    }

    decoder.stop()?;
    Ok(())
}
