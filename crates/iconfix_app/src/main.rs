//! iconfix - repairs iOS CgBI-encoded PNG icons so standard image
//! libraries can read them.
//!
//! The repair is a linear fallback chain: a generic decode/re-encode, the
//! built-in CgBI converter, an external tool (pngcrush or ImageMagick's
//! convert), and finally a manual header patch.

mod repair;

use anyhow::{Context, Result};
use clap::Parser;
use humansize::{DECIMAL, format_size};
use iconfix_core::ToolInvoker;
use iconfix_tools::SystemToolInvoker;
use repair::{EXTERNAL_TOOLS, IconRepairer, RepairMethod};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

const DUMP_BYTES: usize = 48;

#[derive(Parser, Debug)]
#[command(name = "iconfix")]
#[command(version, about = "Repair iOS CgBI-encoded PNG icons", long_about = None)]
struct Args {
    /// Icon file to repair
    #[arg(required_unless_present = "tools")]
    input: Option<PathBuf>,

    /// Where to write the repaired PNG (defaults to overwriting the input)
    output: Option<PathBuf>,

    /// Timeout in seconds for external repair tools
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Hex-dump the input's signature region before repairing
    #[arg(short, long)]
    verbose: bool,

    /// Report which external repair tools are installed and exit
    #[arg(long)]
    tools: bool,
}

fn main() -> Result<ExitCode> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // Usage problems map to exit code 1; --help and --version stay 0.
            let _ = e.print();
            return Ok(if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            });
        }
    };

    let invoker = SystemToolInvoker;

    if args.tools {
        report_tool_availability(&invoker);
        return Ok(ExitCode::SUCCESS);
    }

    let input = args.input.expect("clap requires INPUT unless --tools");
    let output = args.output.unwrap_or_else(|| input.clone());

    if !input.exists() {
        eprintln!("❌ File not found: {}", input.display());
        return Ok(ExitCode::FAILURE);
    }

    let size = fs::metadata(&input)
        .with_context(|| format!("failed to stat {}", input.display()))?
        .len();
    println!(
        "🔍 Repairing icon: {} ({})",
        input.display(),
        format_size(size, DECIMAL)
    );

    if args.verbose {
        dump_signature_region(&input);
    }

    let repairer = IconRepairer::new(invoker).with_timeout(Duration::from_secs(args.timeout));

    match repairer.repair_icon(&input, &output) {
        Ok(method) => {
            report_success(method, &output);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("❌ {e}");
            eprintln!("❌ All repair methods failed for {}", input.display());
            Ok(ExitCode::FAILURE)
        }
    }
}

fn report_success(method: RepairMethod, output: &Path) {
    let dimensions = fs::read(output)
        .ok()
        .and_then(|data| iconfix_core::image_dimensions(&data));

    match dimensions {
        Some((w, h)) => println!(
            "✅ Repaired via {method}: {} ({w}x{h})",
            output.display()
        ),
        None => println!("✅ Repaired via {method}: {}", output.display()),
    }
}

fn report_tool_availability(invoker: &impl ToolInvoker) {
    println!("External repair tools:");
    for tool in EXTERNAL_TOOLS {
        let status = if invoker.is_available(tool.name, tool.probe_args) {
            "available"
        } else {
            "not installed"
        };
        println!("  {:<10} {status}", tool.name);
    }
}

/// Displays the head of the file in hexadecimal (16 bytes per line), which
/// covers the signature plus the first chunk's length and type fields.
fn dump_signature_region(path: &Path) {
    let Ok(data) = fs::read(path) else {
        return;
    };
    let head = &data[..data.len().min(DUMP_BYTES)];

    for (i, chunk) in head.chunks(16).enumerate() {
        print!("{:08x} | ", i * 16);
        for byte in chunk {
            print!("{:02x} ", byte);
        }
        for _ in chunk.len()..16 {
            print!("   ");
        }
        print!("| ");
        for byte in chunk {
            let ch = if byte.is_ascii_graphic() {
                *byte as char
            } else {
                '.'
            };
            print!("{}", ch);
        }
        println!();
    }
}
