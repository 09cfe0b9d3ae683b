//! glint - lightweight X11 terminal front-end
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │        Event Loop (poll PTY + X11)       │
//! ├──────────────────────────────────────────┤
//! │  Input (xkb, mouse)  →  Terminal (VT)    │
//! │  Selection / clipboard (INCR)    ↓       │
//! │        Glyph-run renderer (fontdue)      │
//! │                  ↓                       │
//! │        X11 window (PutImage)             │
//! └──────────────────────────────────────────┘
//! ```

mod config;
mod constants;
mod display;
mod event_loop;
mod font;
mod input;
mod render;
mod selection;
mod terminal;
mod utils;
mod window;

use anyhow::{bail, Context, Result};
use log::info;

use config::Config;
use display::WindowPosition;

/// Parsed command line
#[derive(Debug, Clone, Default, PartialEq)]
struct Args {
    title: Option<String>,
    class: Option<String>,
    name: Option<String>,
    font: Option<String>,
    geometry: Option<Geometry>,
    embed: Option<u32>,
    /// Ask the window manager not to resize the window
    fixed: bool,
    /// Ignore alternate screen requests
    no_altscreen: bool,
    command: Vec<String>,
    help: bool,
    version: bool,
}

/// `COLSxROWS[{+-}X{+-}Y]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Geometry {
    cols: u16,
    rows: u16,
    position: Option<WindowPosition>,
}

fn parse_geometry(spec: &str) -> Option<Geometry> {
    let (size, position) = match spec.find(['+', '-']) {
        Some(i) => (&spec[..i], Some(&spec[i..])),
        None => (spec, None),
    };
    let (cols, rows) = size.split_once('x')?;
    let cols: u16 = cols.parse().ok()?;
    let rows: u16 = rows.parse().ok()?;
    if cols == 0 || rows == 0 {
        return None;
    }

    let position = match position {
        None => None,
        Some(pos) => {
            // Second offset starts at the next sign after the first
            let split = pos[1..].find(['+', '-'])? + 1;
            let (x, y) = (&pos[..split], &pos[split..]);
            // "-0" still anchors to the far edge
            Some(WindowPosition {
                x: x.parse().ok()?,
                y: y.parse().ok()?,
                from_right: x.starts_with('-'),
                from_bottom: y.starts_with('-'),
            })
        }
    };
    Some(Geometry {
        cols,
        rows,
        position,
    })
}

fn parse_window_id(s: &str) -> Option<u32> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Args> {
    let mut parsed = Args::default();
    let mut it = args.into_iter();

    while let Some(arg) = it.next() {
        let mut value = |flag: &str| {
            it.next()
                .with_context(|| format!("option {} requires an argument", flag))
        };
        match arg.as_str() {
            "-h" | "--help" => parsed.help = true,
            "-v" | "-V" | "--version" => parsed.version = true,
            "-t" | "-T" => parsed.title = Some(value(&arg)?),
            "-c" => parsed.class = Some(value(&arg)?),
            "-n" => parsed.name = Some(value(&arg)?),
            "-f" => parsed.font = Some(value(&arg)?),
            "-i" => parsed.fixed = true,
            "-a" => parsed.no_altscreen = true,
            "-g" => {
                let spec = value(&arg)?;
                parsed.geometry = Some(
                    parse_geometry(&spec)
                        .with_context(|| format!("invalid geometry: {}", spec))?,
                );
            }
            "-w" => {
                let id = value(&arg)?;
                parsed.embed =
                    Some(parse_window_id(&id).with_context(|| format!("invalid window id: {}", id))?);
            }
            "-e" => {
                parsed.command = it.by_ref().collect();
                if parsed.command.is_empty() {
                    bail!("option -e requires a command");
                }
            }
            other => bail!("unknown option: {}", other),
        }
    }
    Ok(parsed)
}

/// Print help message
fn print_help() {
    println!(
        r#"glint {} - lightweight X11 terminal

USAGE:
    glint [OPTIONS] [-e COMMAND [ARGS...]]

OPTIONS:
    -h, --help              Print this help message
    -v, --version           Print version information
    -t TITLE                Window title
    -c CLASS                WM_CLASS class
    -n NAME                 WM_CLASS instance name
    -f FONT                 Font family or path to a font file
    -g COLSxROWS[+X+Y]      Initial geometry; negative offsets count from
                            the right and bottom edges
    -i                      Fixed window size
    -a                      Disable the alternate screen
    -w WINDOWID             Embed into an existing window (XEMBED)
    -e COMMAND [ARGS...]    Run COMMAND instead of the shell

CONFIG FILE:
    ~/.config/glint/config.toml (override with GLINT_CONFIG)
"#,
        env!("CARGO_PKG_VERSION")
    );
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("glint: {:#}", e);
            print_help();
            std::process::exit(1);
        }
    };

    if args.help {
        print_help();
        return Ok(());
    }
    if args.version {
        println!("glint {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    info!("glint starting...");

    let mut config = Config::load();
    if let Some(font) = &args.font {
        config.font.family = font.clone();
    }
    if args.no_altscreen {
        config.terminal.allow_altscreen = false;
    }

    run(&config, &args)
}

#[cfg(feature = "x11")]
fn run(config: &Config, args: &Args) -> Result<()> {
    use display::x11::{WindowOptions, X11Display};
    use display::WindowSystem;
    use event_loop::Frontend;
    use font::{FontEngine, FontdueEngine};
    use input::XkbKeyboard;
    use terminal::pty::{Pty, SpawnOptions};
    use window::WindowState;

    // ========== Phase 1: fonts and geometry ==========
    let font = FontdueEngine::load(
        &config.font.family,
        config.font.size,
        config.font.cell_width_scale,
        config.font.cell_height_scale,
    )
    .context("Failed to load font")?;
    let metrics = font.metrics();
    info!(
        "Cell size: {}x{} (ascent {})",
        metrics.cell_width, metrics.cell_height, metrics.ascent
    );

    let (cols, rows) = match args.geometry {
        Some(g) => (g.cols, g.rows),
        None => (config.terminal.cols, config.terminal.rows),
    };
    let mut window = WindowState::new(
        cols as usize,
        rows as usize,
        metrics,
        config.appearance.border,
    );
    window.fixed = args.fixed;
    info!("Phase 1 initialization complete");

    // ========== Phase 2: window ==========
    let title = args.title.clone().unwrap_or_else(|| {
        args.command
            .first()
            .cloned()
            .unwrap_or_else(|| "glint".to_string())
    });
    let options = WindowOptions {
        title,
        instance: args.name.clone().unwrap_or_else(|| "glint".to_string()),
        class: args.class.clone().unwrap_or_else(|| "Glint".to_string()),
        width: window.width,
        height: window.height,
        position: args.geometry.and_then(|g| g.position),
        parent: args.embed,
    };
    let mut display = X11Display::open(&options).context("Failed to open X11 window")?;
    display
        .set_size_hints(
            metrics.cell_width,
            metrics.cell_height,
            window.border,
            window.fixed,
        )
        .context("Failed to set size hints")?;
    let (width, height) = display.size();
    let (cols, rows) = window.resize(width, height);
    info!("Phase 2 initialization complete ({}x{} cells)", cols, rows);

    // ========== Phase 3: input and child ==========
    let keys = XkbKeyboard::new(&config.keyboard).context("Failed to initialize keyboard")?;

    let spawn = SpawnOptions {
        term: config.terminal.term.clone(),
        command: args.command.clone(),
        shell: (!config.terminal.shell.is_empty()).then(|| config.terminal.shell.clone()),
        window_id: Some(display.window_id()),
    };
    let pty = Pty::spawn(
        cols as u16,
        rows as u16,
        window.tw as u16,
        window.th as u16,
        &spawn,
    )
    .context("Failed to spawn child process")?;
    info!("Phase 3 initialization complete");

    let mut frontend = Frontend::new(config, display, font, pty, Box::new(keys), window);
    frontend.run()
}

#[cfg(not(feature = "x11"))]
fn run(_config: &Config, _args: &Args) -> Result<()> {
    bail!("glint was built without X11 support (enable the \"x11\" feature)")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_geometry() {
        assert_eq!(
            parse_geometry("100x30"),
            Some(Geometry {
                cols: 100,
                rows: 30,
                position: None
            })
        );
        assert_eq!(
            parse_geometry("80x24+10-20").and_then(|g| g.position),
            Some(WindowPosition {
                x: 10,
                y: -20,
                from_right: false,
                from_bottom: true,
            })
        );
        assert_eq!(
            parse_geometry("80x24-0+0").and_then(|g| g.position),
            Some(WindowPosition {
                x: 0,
                y: 0,
                from_right: true,
                from_bottom: false,
            })
        );
        assert_eq!(parse_geometry("80x"), None);
        assert_eq!(parse_geometry("0x24"), None);
        assert_eq!(parse_geometry("80x24+10"), None);
    }

    #[test]
    fn test_parse_args() {
        let a = args(&["-t", "hi", "-g", "90x20", "-w", "0x1a00003", "-e", "vim", "-t"]).unwrap();
        assert_eq!(a.title.as_deref(), Some("hi"));
        assert_eq!(a.geometry.map(|g| (g.cols, g.rows)), Some((90, 20)));
        assert_eq!(a.embed, Some(0x1a0_0003));
        // Everything after -e belongs to the command
        assert_eq!(a.command, vec!["vim".to_string(), "-t".to_string()]);

        assert!(args(&["-f"]).is_err());
        assert!(args(&["-e"]).is_err());
        assert!(args(&["--bogus"]).is_err());
        assert!(args(&["-h"]).unwrap().help);

        let a = args(&["-i", "-a"]).unwrap();
        assert!(a.fixed);
        assert!(a.no_altscreen);
        assert!(!args(&[]).unwrap().fixed);
    }
}
