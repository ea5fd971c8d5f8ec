//! Build, inspect and edit wifi-xBridge EEPROM configuration images.
//!
//! An image is a file with the 4096 bytes of the configuration region. It can
//! be generated from a TOML file and flashed to the bridge, or read back from
//! a bridge and inspected.

use std::{fs, path::Path, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::{record, BridgeConfiguration, ConfigStore, TransmitterId};
use log::{info, warn};
use xbridge_common::transmitter_id::{to_code, to_id};

mod image;

use image::ImageFile;

#[derive(Parser)]
#[clap(version, about)]
struct Opts {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a new image from a configuration file in TOML format.
    Build {
        /// Path to a configuration file in TOML format.
        #[clap(short, long)]
        config: PathBuf,
        /// Path of the image to write.
        #[clap(short, long)]
        output: PathBuf,
    },
    /// Print the configuration stored in an image.
    Show {
        #[clap(short, long)]
        image: PathBuf,
    },
    /// Print the raw configuration record of an image.
    Dump {
        #[clap(short, long)]
        image: PathBuf,
    },
    /// Set the transmitter, given as five character code.
    SetTransmitter {
        #[clap(short, long)]
        image: PathBuf,
        code: String,
    },
    /// Set the address of the remote server.
    SetServer {
        #[clap(short, long)]
        image: PathBuf,
        address: String,
    },
    /// Set name and/or password of the hotspot opened by the bridge.
    SetAccessPoint {
        #[clap(short, long)]
        image: PathBuf,
        #[clap(long)]
        name: Option<String>,
        #[clap(long)]
        password: Option<String>,
    },
    /// Remember a Wi-Fi network.
    AddNetwork {
        #[clap(short, long)]
        image: PathBuf,
        #[clap(long)]
        ssid: String,
        #[clap(long, default_value = "")]
        password: String,
    },
    /// Forget all Wi-Fi networks with this SSID.
    DeleteNetwork {
        #[clap(short, long)]
        image: PathBuf,
        #[clap(long)]
        ssid: String,
    },
    /// Convert a packed transmitter id into its code.
    Code { id: u32 },
    /// Convert a transmitter code into the packed id.
    Id { code: String },
}

/// Parse a configuration file.
fn read_config(path: &Path) -> Result<BridgeConfiguration> {
    let source = fs::read_to_string(path).context("Could not read config file")?;
    toml::from_str(&source).context("Could not parse config file")
}

/// Store `config` in a blank image.
fn build(config: &BridgeConfiguration, output: &Path) -> Result<ImageFile> {
    let mut store = ConfigStore::new(ImageFile::blank(output));
    store.set_transmitter_id(config.transmitter_id);
    store.set_server_address(&config.server_address)?;
    store.set_access_point_name(&config.access_point_name)?;
    store.set_access_point_password(&config.access_point_password)?;
    for network in &config.known_networks {
        store.save_network(&network.ssid, &network.password)?;
    }
    store.save().context("Could not save configuration")?;
    Ok(store.into_storage())
}

/// Load the configuration of an image, apply `change` and save it again.
fn edit<F>(path: &Path, change: F) -> Result<()>
where
    F: FnOnce(&mut ConfigStore<ImageFile>) -> Result<()>,
{
    let image = ImageFile::open(path)?;
    let mut store = ConfigStore::open(image).context("Could not load configuration")?;
    change(&mut store)?;
    store.save().context("Could not save configuration")?;
    info!("Updated {}", store.storage().path().display());
    Ok(())
}

fn show(store: &ConfigStore<ImageFile>) {
    let id = store.transmitter_id();
    println!("Transmitter:     {} ({})", id, id.as_u32());
    println!("Server address:  {}", store.server_address());
    println!("Access point:    {}", store.access_point_name());
    println!(
        "AP password:     {}",
        if store.access_point_password().is_empty() {
            "<none>"
        } else {
            "<set>"
        }
    );
    println!("Known networks:  {}", store.network_count());
    for (i, network) in store.networks().enumerate() {
        println!(
            "  {}: {}{}",
            i,
            network.ssid,
            if network.password.is_empty() { " (open)" } else { "" }
        );
    }
}

/// Format the bytes of the configuration record, 16 per line.
fn dump(bytes: &[u8]) -> String {
    let end = if bytes.first() == Some(&record::MARKER) {
        (record::record_end(bytes) + 1).min(bytes.len())
    } else {
        1
    };
    let mut out = String::new();
    for (i, byte) in bytes[..end].iter().enumerate() {
        out.push_str(&format!(" {:02x}", byte));
        if (i + 1) % 16 == 0 {
            out.push('\n');
        }
    }
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

fn main() -> Result<()> {
    env_logger::init();

    // Parse command line args
    let opts: Opts = Opts::parse();

    match opts.command {
        Command::Build { config, output } => {
            let config = read_config(&config)?;
            let image = build(&config, &output)?;
            println!(
                "Wrote {} ({} of {} bytes used)",
                image.path().display(),
                record::encoded_len(&config),
                record::CAPACITY
            );
        }
        Command::Show { image } => {
            let store = ConfigStore::open(ImageFile::open(&image)?)
                .context("Could not load configuration")?;
            show(&store);
        }
        Command::Dump { image } => {
            let image = ImageFile::open(&image)?;
            print!("{}", dump(image.as_bytes()));
        }
        Command::SetTransmitter { image, code } => {
            let id = TransmitterId::from_code(&code)
                .with_context(|| format!("Invalid transmitter code {:?}", code))?;
            edit(&image, |store| {
                store.set_transmitter_id(id);
                Ok(())
            })?;
        }
        Command::SetServer { image, address } => {
            edit(&image, |store| Ok(store.set_server_address(&address)?))?;
        }
        Command::SetAccessPoint {
            image,
            name,
            password,
        } => {
            edit(&image, |store| {
                if let Some(name) = &name {
                    store.set_access_point_name(name)?;
                }
                if let Some(password) = &password {
                    store.set_access_point_password(password)?;
                }
                Ok(())
            })?;
        }
        Command::AddNetwork {
            image,
            ssid,
            password,
        } => {
            edit(&image, |store| Ok(store.save_network(&ssid, &password)?))?;
        }
        Command::DeleteNetwork { image, ssid } => {
            edit(&image, |store| {
                if store.delete_network(&ssid) == 0 {
                    warn!("No network named {:?}", ssid);
                }
                Ok(())
            })?;
        }
        Command::Code { id } => {
            if id >> 25 != 0 {
                warn!("Only the lowest 25 bits of {} are part of the code", id);
            }
            println!("{}", to_code(id));
        }
        Command::Id { code } => {
            let id = to_id(&code).with_context(|| format!("Invalid transmitter code {:?}", code))?;
            println!("{}", id);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use config::WifiCredential;

    use super::*;

    const EXAMPLE: &str = r#"
        transmitter_id = "028S5"
        server_address = "myaddress.example.com"

        [[known_networks]]
        ssid = "home"
        password = "secret"

        [[known_networks]]
        ssid = "cafe"
    "#;

    #[test]
    fn test_parse_config() {
        let config: BridgeConfiguration = toml::from_str(EXAMPLE).unwrap();
        assert_eq!(config.transmitter_id.as_u32(), 74565);
        assert_eq!(config.server_address, "myaddress.example.com");
        assert_eq!(config.access_point_name, "wifi-xBridge");
        assert_eq!(config.access_point_password, "");
        assert_eq!(
            config.known_networks,
            vec![
                WifiCredential::new("home", "secret"),
                WifiCredential::new("cafe", ""),
            ]
        );
    }

    #[test]
    fn test_parse_config_invalid_code() {
        let result: Result<BridgeConfiguration, _> = toml::from_str(r#"transmitter_id = "OOOOO""#);
        assert!(result.is_err());
    }

    #[test]
    fn test_build_image() {
        let config: BridgeConfiguration = toml::from_str(EXAMPLE).unwrap();
        let path = std::env::temp_dir().join(format!("xbridge-{}-build.bin", std::process::id()));

        let image = build(&config, &path).unwrap();
        assert_eq!(&image.as_bytes()[..5], &[0xB6, 0x45, 0x23, 0x01, 0x00]);

        let store = ConfigStore::open(ImageFile::open(&path).unwrap()).unwrap();
        assert_eq!(store.get(), &config);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_build_rejects_reserved_bytes() {
        let config = BridgeConfiguration {
            server_address: "a\u{AC}b".into(),
            ..BridgeConfiguration::default()
        };
        let path = std::env::temp_dir().join(format!("xbridge-{}-reserved.bin", std::process::id()));
        assert!(build(&config, &path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_dump() {
        let mut bytes = vec![0xB6, 1, 0, 0, 0];
        bytes.extend_from_slice(b"abcdefghij\xAC");
        bytes.push(0xFF);
        bytes.extend_from_slice(&[0xFF; 8]);
        assert_eq!(
            dump(&bytes),
            " b6 01 00 00 00 61 62 63 64 65 66 67 68 69 6a ac\n ff\n"
        );
    }

    #[test]
    fn test_dump_blank() {
        assert_eq!(dump(&[0xFF; 32]), " ff\n");
    }
}
