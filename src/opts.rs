//! Command-line configuration (spec.md: "command-line argument handling"
//! is an external collaborator; this is its contract).

use clap::Parser;

/// Passively reconstruct MySQL-dialect SQL traffic from a live interface.
#[derive(Debug, Clone, Parser)]
#[command(name = "mysql-sniff", version, about)]
pub struct Opts {
    /// Network interface to capture on
    #[arg(short = 'i', long, default_value = "eth0")]
    pub interface: String,

    /// TCP port the database server listens on
    #[arg(short = 'p', long = "port", default_value_t = 4000)]
    pub port: u16,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            interface: "eth0".to_string(),
            port: 4000,
        }
    }
}

impl Opts {
    /// Parse CLI args from the real process argv.
    ///
    /// spec.md §6 documents the port flag as `-port <n>`, the single-dash
    /// spelling of the original's `flag.Int("port", ...)`. clap's own
    /// `-p`/`--port` (declared above) can't parse that directly: clap would
    /// read `-port` as short flag `-p` with the attached value `"ort"`,
    /// leaving `4000` as a stray positional. Rewriting the literal `-port`
    /// token to `--port` before handing argv to clap makes both the
    /// documented invocation and clap's own `-p`/`--port` work.
    pub fn parse_args() -> Self {
        Self::parse_from(Self::normalize_legacy_port_flag(std::env::args()))
    }

    fn normalize_legacy_port_flag(args: impl Iterator<Item = String>) -> Vec<String> {
        args.map(|arg| if arg == "-port" { "--port".to_string() } else { arg })
            .collect()
    }
}
