use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Deserialize)]
struct Config {
    application: Application,
    network: Network,
    audio: Audio,
    session: Session,
}

#[derive(Deserialize)]
struct Application {
    name: String,
    version: String,
}

#[derive(Deserialize)]
struct Network {
    ws_url: String,
}

#[derive(Deserialize)]
struct Audio {
    capture_device: String,
    sample_rate: u32,
    channels: u32,
    block_size: usize,
    echo_cancellation: bool,
    noise_suppression: bool,
}

#[derive(Deserialize)]
struct Session {
    channel_buffer: usize,
}

// Read config.toml at compile time and expose it through rustc-env
fn main() {
    println!("cargo:rerun-if-changed=config.toml");

    let config_path = Path::new("config.toml");
    if !config_path.exists() {
        panic!("config.toml not found!");
    }

    let config_str = fs::read_to_string(config_path).expect("Failed to read config.toml");
    let config: Config = toml::from_str(&config_str).expect("Failed to parse config.toml");

    println!("cargo:rustc-env=APP_NAME={}", config.application.name);
    println!("cargo:rustc-env=APP_VERSION={}", config.application.version);

    println!("cargo:rustc-env=WS_URL={}", config.network.ws_url);

    println!("cargo:rustc-env=CAPTURE_DEVICE={}", config.audio.capture_device);
    println!("cargo:rustc-env=SAMPLE_RATE={}", config.audio.sample_rate);
    println!("cargo:rustc-env=CHANNELS={}", config.audio.channels);
    println!("cargo:rustc-env=BLOCK_SIZE={}", config.audio.block_size);
    println!(
        "cargo:rustc-env=ECHO_CANCELLATION={}",
        config.audio.echo_cancellation
    );
    println!(
        "cargo:rustc-env=NOISE_SUPPRESSION={}",
        config.audio.noise_suppression
    );

    println!(
        "cargo:rustc-env=CHANNEL_BUFFER={}",
        config.session.channel_buffer
    );
}
