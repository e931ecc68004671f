//! `vela-hostwriter bind`: embed an application path in an apphost.

use anyhow::{bail, Context};
use std::fs;
use std::path::Path;

use vela_host::binding::patch_image;

use crate::output::StyledOutput;

/// Copy `template` to `output` with `app` written into its binding region.
///
/// Returns the offset of the region.
pub fn bind(template: &Path, app: &str, output: &Path) -> anyhow::Result<usize> {
    if Path::new(app).is_absolute() {
        bail!("application path must be relative to the apphost, got '{}'", app);
    }

    let mut image =
        fs::read(template).with_context(|| format!("failed to read {}", template.display()))?;
    let offset = patch_image(&mut image, app)
        .with_context(|| format!("cannot bind {}", template.display()))?;
    super::write_executable(output, &image, template)?;
    Ok(offset)
}

pub fn execute(out: &mut StyledOutput, template: &Path, app: &str, output: &Path) -> anyhow::Result<()> {
    let offset = bind(template, app, output)?;
    out.status("Bound", &format!("{} -> {}", output.display(), app));
    out.dim(&format!("binding region at offset 0x{:x}", offset));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vela_host::binding::{
        decode_binding, EMBED_HASH_HI_PART, EMBED_HASH_LO_PART, EMBED_SIZE, HALF_LEN, SENTINEL_LEN,
    };

    fn template_region() -> Vec<u8> {
        let mut region = vec![0u8; EMBED_SIZE];
        region[..HALF_LEN].copy_from_slice(&EMBED_HASH_HI_PART[..HALF_LEN]);
        region[HALF_LEN..SENTINEL_LEN].copy_from_slice(&EMBED_HASH_LO_PART[..HALF_LEN]);
        region
    }

    fn write_template(dir: &Path) -> std::path::PathBuf {
        let mut image = b"\x7fELF apphost".to_vec();
        image.extend_from_slice(&template_region());
        image.extend_from_slice(b"more code");
        let path = dir.join("vela-apphost");
        fs::write(&path, image).unwrap();
        path
    }

    #[test]
    fn test_bind_writes_binding() {
        let temp = TempDir::new().unwrap();
        let template = write_template(temp.path());
        let output = temp.path().join("out").join("demo");

        let offset = bind(&template, "lib/demo.dll", &output).unwrap();

        let image = fs::read(&output).unwrap();
        assert_eq!(
            decode_binding(&image[offset..offset + EMBED_SIZE]).unwrap(),
            "lib/demo.dll"
        );
        // The template itself is left untouched.
        assert_eq!(fs::read(&template).unwrap()[offset..offset + 4], template_region()[..4]);
    }

    #[test]
    fn test_bound_output_cannot_be_bound_again() {
        let temp = TempDir::new().unwrap();
        let template = write_template(temp.path());
        let once = temp.path().join("once");
        bind(&template, "demo.dll", &once).unwrap();

        let err = bind(&once, "other.dll", &temp.path().join("twice")).unwrap_err();
        assert!(format!("{:#}", err).contains("placeholder was not found"));
    }

    #[test]
    fn test_stray_placeholder_text_is_ignored() {
        let temp = TempDir::new().unwrap();
        let mut image = template_region()[..SENTINEL_LEN].to_vec();
        image.extend_from_slice(b"comparison data");
        let region_offset = image.len();
        image.extend_from_slice(&template_region());
        let template = temp.path().join("vela-apphost");
        fs::write(&template, image).unwrap();

        let once = temp.path().join("once");
        assert_eq!(bind(&template, "demo.dll", &once).unwrap(), region_offset);
        assert!(bind(&once, "other.dll", &temp.path().join("twice")).is_err());
    }

    #[test]
    fn test_bind_rejects_absolute_path() {
        let temp = TempDir::new().unwrap();
        let template = write_template(temp.path());
        let absolute = if cfg!(windows) { "C:\\apps\\demo.dll" } else { "/apps/demo.dll" };
        assert!(bind(&template, absolute, &temp.path().join("demo")).is_err());
    }
}
