//! Пример озвучивания сценария диалога
//!
//! Читает сценарий из файла, выводит замечания парсера, назначает голоса
//! персонажам и по очереди отправляет реплики в сервис генерации.
//!
//! Запуск: `cargo run --example generate_dialogue -- script.txt`

use anyhow::{bail, Context};
use tts_studio::dialogue::CastSheet;
use tts_studio::models::{Engine, ExportFormat, ExportOptions, SynthesisConfig};
use tts_studio::notification::LogStateObserver;
use tts_studio::TtsStudio;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Инициализируем логирование
    env_logger::init();

    let path = match std::env::args().nth(1) {
        Some(path) => path,
        None => bail!("usage: generate_dialogue <script.txt>"),
    };
    let script = std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path))?;

    let studio = TtsStudio::from_env()?;
    let dialogue = studio.parse_script(&script)?;

    for issue in &dialogue.issues {
        println!("Строка {}: {}", issue.line, issue.message);
    }
    println!(
        "Персонажи: {} ({} реплик)",
        dialogue.characters.join(", "),
        dialogue.utterances.len()
    );

    let voices = ["vi_VN-vais1000-medium", "en_US-lessac-medium", "en_US-amy-medium"];
    let mut cast = CastSheet::new().with_default(SynthesisConfig::new(voices[0]));
    for (i, speaker) in dialogue.characters.iter().enumerate() {
        cast.assign(speaker.clone(), SynthesisConfig::new(voices[i % voices.len()]));
    }

    let export = ExportOptions::new(ExportFormat::Mp3).with_bitrate(192);
    let requests = cast.build_requests(&dialogue, Engine::Piper, Some(&export))?;

    let controller = studio.job_controller();
    controller.add_observer(Box::new(LogStateObserver::with_prefix("[job] ")));

    for line in requests {
        controller.start(line.request);
        let state = controller.wait_until_settled().await;

        match (state.result, state.error) {
            (Some(result), None) => {
                let metrics = result
                    .metrics
                    .map(|m| format!("{:.1} LUFS, peak {:.1} dB", m.lufs_integrated, m.true_peak_db))
                    .unwrap_or_else(|| "no metrics".to_string());
                println!("#{} {}: {} ({})", line.index, line.speaker, result.url, metrics);
            }
            (_, error) => {
                println!(
                    "#{} {}: failed: {}",
                    line.index,
                    line.speaker,
                    error.unwrap_or_else(|| "unknown error".to_string())
                );
            }
        }
    }

    Ok(())
}
