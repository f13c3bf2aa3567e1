//! The fallback repair pipeline: a generic re-encode first, then the
//! CgBI-aware strategies in strict priority order. Every strategy error is
//! caught, reported on the console, and converted into fall-through; only
//! the final outcome escapes to the caller.

use iconfix_core::{RepairError, Result, ToolInvoker, cgbi, png};
use image::ImageFormat;
use std::ffi::OsStr;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// External executable known to repair CgBI icons, with its probe
/// invocation and repair flags.
pub struct ExternalTool {
    pub name: &'static str,
    pub probe_args: &'static [&'static str],
    pub repair_flags: &'static [&'static str],
}

/// Probe order is fixed: the PNG-specific tool is preferred over the
/// general image converter, and only the first tool found is invoked.
pub const EXTERNAL_TOOLS: &[ExternalTool] = &[
    ExternalTool {
        name: "pngcrush",
        probe_args: &["-version"],
        repair_flags: &["-revert-iphone-optimizations"],
    },
    ExternalTool {
        name: "convert",
        probe_args: &["--version"],
        repair_flags: &[],
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairMethod {
    GenericDecode,
    CgbiConvert,
    ExternalTool(&'static str),
    ManualPatch,
}

impl fmt::Display for RepairMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepairMethod::GenericDecode => write!(f, "generic re-encode"),
            RepairMethod::CgbiConvert => write!(f, "built-in CgBI converter"),
            RepairMethod::ExternalTool(name) => write!(f, "{name}"),
            RepairMethod::ManualPatch => write!(f, "manual header patch"),
        }
    }
}

type Strategy<T> = fn(&IconRepairer<T>, &[u8], &Path, &Path) -> Result<RepairMethod>;

pub struct IconRepairer<T> {
    invoker: T,
    tool_timeout: Duration,
}

impl<T: ToolInvoker> IconRepairer<T> {
    pub fn new(invoker: T) -> Self {
        Self {
            invoker,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Attempts every repair strategy in order and reports the one that
    /// produced the output file.
    pub fn repair_icon(&self, input: &Path, output: &Path) -> Result<RepairMethod> {
        if !input.exists() {
            return Err(RepairError::NotFound(input.display().to_string()));
        }

        // Dominant path: a healthy image re-encodes without any byte
        // inspection.
        match self.generic_reencode(input, output) {
            Ok(()) => return Ok(RepairMethod::GenericDecode),
            Err(e) => eprintln!("[Repair] generic re-encode failed: {e}"),
        }

        let data = fs::read(input)?;
        if !png::is_cgbi(&data) {
            return Err(RepairError::UnsupportedFormat(format!(
                "{}: not a decodable image and no CgBI marker",
                input.display()
            )));
        }

        println!("[Repair] CgBI marker found, trying repair strategies");

        let mut last_error = RepairError::PatchFailed("no repair strategy ran".into());
        for (label, strategy) in Self::cgbi_strategies() {
            match strategy(self, &data, input, output) {
                Ok(method) => return Ok(method),
                Err(e) => {
                    eprintln!("[Repair] {label} failed: {e}");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    fn cgbi_strategies() -> [(&'static str, Strategy<T>); 3] {
        [
            ("built-in CgBI converter", Self::try_builtin_convert),
            ("external tool", Self::try_external_tool),
            ("manual header patch", Self::try_manual_patch),
        ]
    }

    fn generic_reencode(&self, input: &Path, output: &Path) -> Result<()> {
        let img = image::ImageReader::open(input)?
            .with_guessed_format()?
            .decode()?;
        img.save_with_format(output, ImageFormat::Png)?;
        Ok(())
    }

    fn try_builtin_convert(&self, data: &[u8], _input: &Path, output: &Path) -> Result<RepairMethod> {
        let fixed = cgbi::convert(data)?;
        fs::write(output, fixed)?;
        Ok(RepairMethod::CgbiConvert)
    }

    fn try_external_tool(&self, _data: &[u8], input: &Path, output: &Path) -> Result<RepairMethod> {
        let tool = EXTERNAL_TOOLS
            .iter()
            .find(|t| self.invoker.is_available(t.name, t.probe_args))
            .ok_or_else(|| {
                RepairError::ToolUnavailable("neither pngcrush nor convert is installed".into())
            })?;

        let mut args: Vec<&OsStr> = tool.repair_flags.iter().map(OsStr::new).collect();
        args.push(input.as_os_str());
        args.push(output.as_os_str());

        let outcome = self.invoker.run(tool.name, &args, self.tool_timeout)?;
        if !outcome.success {
            let message = if outcome.stderr.trim().is_empty() {
                "exited with a non-zero status".to_string()
            } else {
                outcome.stderr.trim().to_string()
            };
            return Err(RepairError::ToolExecution {
                tool: tool.name.to_string(),
                message,
            });
        }
        if !output.exists() {
            return Err(RepairError::ToolExecution {
                tool: tool.name.to_string(),
                message: "produced no output file".to_string(),
            });
        }

        Ok(RepairMethod::ExternalTool(tool.name))
    }

    /// Last-resort heuristic: rename the CgBI marker to IHDR and see
    /// whether the image library tolerates the resulting chunk layout.
    fn try_manual_patch(&self, data: &[u8], _input: &Path, output: &Path) -> Result<RepairMethod> {
        let patched = png::patch_cgbi_marker(data)
            .ok_or_else(|| RepairError::PatchFailed("input lost its CgBI marker".into()))?;

        let temp_path = temp_patch_path(output);
        fs::write(&temp_path, &patched)?;

        let decode_result: Result<()> = (|| {
            let img = image::ImageReader::open(&temp_path)?
                .with_guessed_format()?
                .decode()?;
            img.save_with_format(output, ImageFormat::Png)?;
            Ok(())
        })();

        // The temporary file must not outlive the attempt, whatever the
        // outcome was.
        let _ = fs::remove_file(&temp_path);

        decode_result.map_err(|e| RepairError::PatchFailed(e.to_string()))?;
        Ok(RepairMethod::ManualPatch)
    }
}

fn temp_patch_path(output: &Path) -> PathBuf {
    let mut path = output.as_os_str().to_os_string();
    path.push(".tmp");
    PathBuf::from(path)
}
