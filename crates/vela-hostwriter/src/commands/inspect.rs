//! `vela-hostwriter inspect`: report binding and bundle state.

use anyhow::Context;
use std::fs;
use std::path::Path;

use vela_host::binding::{find_placeholder, BindingError};
use vela_host::bundle::{read_trailer, BundleRunner};

use crate::output::StyledOutput;

pub fn execute(out: &mut StyledOutput, executable: &Path) -> anyhow::Result<()> {
    let image =
        fs::read(executable).with_context(|| format!("failed to read {}", executable.display()))?;

    out.field("Executable", &executable.display().to_string());
    out.field("Size", &format!("{} bytes", image.len()));

    let binding = match find_placeholder(&image) {
        Ok(offset) => format!("unbound template (placeholder at 0x{:x})", offset),
        Err(BindingError::AmbiguousSentinel { count }) => {
            format!("ambiguous, {} placeholder regions", count)
        }
        Err(_) => "bound, or not an apphost".to_string(),
    };
    out.field("Binding", &binding);

    let trailer = read_trailer(executable)
        .with_context(|| format!("failed to read {}", executable.display()))?;
    if trailer.is_none() {
        out.field("Bundle", "none");
        return Ok(());
    }

    let (trailer, entries) = BundleRunner::new(executable, "")
        .inspect()
        .with_context(|| format!("invalid bundle in {}", executable.display()))?;
    let payload_offset = trailer.payload_offset;
    out.field("Bundle", &format!("id {}, {} files", trailer.bundle_id(), entries.len()));
    out.field("Payload", &format!("starts at 0x{:x}", payload_offset));
    for entry in &entries {
        out.dim(&format!("  {:>10}  {}", entry.size, entry.path));
    }
    Ok(())
}
