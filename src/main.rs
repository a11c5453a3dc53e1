use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use visionpal::camera::{FfmpegCamera, FrameSource};
use visionpal::config::{ConfigPaths, bootstrap};
use visionpal::frontend::{ConsolePresenter, DescribeSession};
use visionpal::picker::validate_image_path;
use visionpal::voice::{
    AudioCapture, AudioPlayback, MicListener, SpeechToText, TextToSpeech, VoiceSpeaker,
    calculate_energy, decode_mp3,
};
use visionpal::{Config, Daemon, DescriberClient, ImageHandle, Language};

/// `VisionPal` - voice-driven image description assistant
#[derive(Parser)]
#[command(name = "visionpal", version, about)]
struct Cli {
    /// Config file (default: platform config directory)
    #[arg(short, long, env = "VISIONPAL_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Run the voice assistant (default)
    Run,
    /// Describe one image, optionally answering follow-up questions
    Describe {
        /// Image file (png, jpg, jpeg, bmp)
        image: PathBuf,
        /// Custom prompt instead of the language's default
        #[arg(short, long)]
        prompt: Option<String>,
        /// Language code for prompts and speech ("en" or "ar")
        #[arg(short, long, default_value = "en")]
        language: String,
        /// Keep answering follow-up questions about the image
        #[arg(long)]
        ask: bool,
        /// Take the prompt and follow-ups by voice
        #[arg(long)]
        voice: bool,
        /// Print the description without speaking it
        #[arg(long)]
        no_speak: bool,
    },
    /// Create default config and credential files
    Init,
    /// Interactive first-run setup
    Setup,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
        /// Language code ("en" or "ar")
        #[arg(short, long, default_value = "en")]
        language: String,
    },
    /// Grab one camera frame and save it
    TestCamera {
        /// Where to write the JPEG
        #[arg(short, long, default_value = "visionpal-test.jpg")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,visionpal=info",
        1 => "info,visionpal=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            if is_config_error(&e) {
                eprintln!("Check your settings with `visionpal init` or `visionpal setup`.");
                ExitCode::from(EXIT_CONFIG)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

/// Exit status for configuration and credential problems
const EXIT_CONFIG: u8 = 2;

fn is_config_error(err: &anyhow::Error) -> bool {
    err.downcast_ref::<visionpal::Error>()
        .is_some_and(visionpal::Error::is_fatal)
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_voice(config_path).await,
        Command::Describe {
            image,
            prompt,
            language,
            ask,
            voice,
            no_speak,
        } => {
            let options = DescribeOptions {
                image,
                prompt,
                language: parse_language(&language)?,
                ask,
                voice,
                speak: !no_speak,
            };
            run_describe(config_path, options).await
        }
        Command::Init => init(config_path),
        Command::Setup => visionpal::setup::run_setup(config_path),
        Command::TestMic { duration } => test_mic(duration).await,
        Command::TestSpeaker => test_speaker().await,
        Command::TestTts { text, language } => {
            test_tts(config_path, &text, parse_language(&language)?).await
        }
        Command::TestCamera { output } => test_camera(config_path, &output),
    }
}

fn parse_language(code: &str) -> anyhow::Result<Language> {
    Language::from_code(code)
        .ok_or_else(|| anyhow::anyhow!("unsupported language {code:?}, use \"en\" or \"ar\""))
}

/// Voice mode
async fn run_voice(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;
    tracing::debug!(?config, "loaded configuration");

    tracing::info!(model = %config.vision.model, "starting visionpal");

    let daemon = Daemon::new(config, Arc::new(ConsolePresenter::new()))?;
    daemon.run().await;

    Ok(())
}

struct DescribeOptions {
    image: PathBuf,
    prompt: Option<String>,
    language: Language,
    ask: bool,
    voice: bool,
    speak: bool,
}

/// Describe mode
async fn run_describe(config_path: Option<&Path>, options: DescribeOptions) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;
    let api_key = config.api_key()?;
    let image = validate_image_path(&options.image)?;

    let describer = DescriberClient::new(&config.vision, api_key.clone())?;
    let profile = config.profiles.get(options.language).clone();

    let mut session = DescribeSession::new(
        Arc::new(describer),
        ImageHandle::selected(image),
        profile,
        config.vision.timeout,
    );

    if options.speak {
        let tts = TextToSpeech::new(&config.voice, api_key.clone())?;
        session = session.with_speaker(Arc::new(VoiceSpeaker::new(tts)));
    }

    if options.voice {
        let stt = SpeechToText::new(&config.voice, api_key)?;
        session = session.with_listener(Arc::new(MicListener::new(
            stt,
            config.voice.phrase_limit,
            config.voice.calibration,
        )));
    }

    session.run(options.prompt, options.ask).await?;
    Ok(())
}

/// Write default files and show where they live
fn init(config_path: Option<&Path>) -> anyhow::Result<()> {
    let paths = config_path.map_or_else(ConfigPaths::default_location, ConfigPaths::for_config_file);

    if bootstrap(&paths)? {
        println!("Created default files.");
    } else {
        println!("Files already exist.");
    }
    println!("Config:      {}", paths.config_file.display());
    println!("Credentials: {}", paths.credentials_file.display());

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    let sample_rate = capture.sample_rate();
    println!("Sample rate: {sample_rate} Hz");
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.peek_buffer();
        let energy = calculate_energy(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );

        capture.clear_buffer();
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sample_rate = 24000_u32;
    let frequency = 440.0_f32;
    let num_samples = sample_rate as usize * 2;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);

    let stop = Arc::new(AtomicBool::new(false));
    tokio::task::spawn_blocking(move || {
        AudioPlayback::with_sample_rate(sample_rate)?.play_blocking(samples, &stop)
    })
    .await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// Test TTS output
async fn test_tts(config_path: Option<&Path>, text: &str, language: Language) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load(config_path)?;
    let tts = TextToSpeech::new(&config.voice, config.api_key()?)?;

    println!("Synthesizing speech...");
    let mp3_data = tts.synthesize(text, language.code()).await?;
    println!("Got {} bytes of audio data", mp3_data.len());

    let audio = decode_mp3(&mp3_data)?;
    println!(
        "Playing {} samples at {} Hz...",
        audio.samples.len(),
        audio.sample_rate
    );

    let stop = Arc::new(AtomicBool::new(false));
    tokio::task::spawn_blocking(move || {
        AudioPlayback::with_sample_rate(audio.sample_rate)?.play_blocking(audio.samples, &stop)
    })
    .await??;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}

/// Grab one frame from the configured camera
fn test_camera(config_path: Option<&Path>, output: &Path) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;
    println!("Opening camera {}...", config.camera.device_index);

    let mut camera = FfmpegCamera::new(config.camera);
    camera.open()?;
    let frame = camera.read_frame();
    camera.close();

    let frame = frame?;
    std::fs::write(output, frame.jpeg())?;
    println!("Saved {} bytes to {}", frame.jpeg().len(), output.display());

    Ok(())
}
