pub mod bind;
pub mod bundle;
pub mod inspect;

use anyhow::Context;
use std::fs;
use std::path::Path;

/// Write `image` to `output`, copying the permissions of `like`.
pub(crate) fn write_executable(output: &Path, image: &[u8], like: &Path) -> anyhow::Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(output, image).with_context(|| format!("failed to write {}", output.display()))?;

    let permissions = fs::metadata(like)
        .with_context(|| format!("failed to read {}", like.display()))?
        .permissions();
    fs::set_permissions(output, permissions)
        .with_context(|| format!("failed to set permissions on {}", output.display()))?;
    Ok(())
}
