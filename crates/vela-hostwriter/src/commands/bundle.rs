//! `vela-hostwriter bundle`: append application files to an apphost.

use anyhow::{bail, Context};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Component, Path, PathBuf};

use vela_host::binding::find_placeholder;
use vela_host::bundle::{read_trailer, write_bundle, BundleTrailer};

use crate::output::StyledOutput;

/// Files under `source` matching any of `patterns`, keyed by their
/// `/`-separated relative path.
pub fn collect_files(source: &Path, patterns: &[String]) -> anyhow::Result<BTreeMap<String, PathBuf>> {
    let mut files = BTreeMap::new();
    for pattern in patterns {
        let full = source.join(pattern);
        let matches = glob::glob(&full.to_string_lossy())
            .with_context(|| format!("invalid pattern '{}'", pattern))?;
        for path in matches {
            let path = path.context("failed to read a matched path")?;
            if !path.is_file() {
                continue;
            }
            let relative = path
                .strip_prefix(source)
                .with_context(|| format!("{} is outside {}", path.display(), source.display()))?;
            files.insert(bundle_path(relative)?, path);
        }
    }
    Ok(files)
}

fn bundle_path(relative: &Path) -> anyhow::Result<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => match part.to_str() {
                Some(part) => parts.push(part),
                None => bail!("{} is not valid UTF-8", relative.display()),
            },
            _ => bail!("{} is not a plain relative path", relative.display()),
        }
    }
    Ok(parts.join("/"))
}

/// Write `host` followed by a bundle of `files` to `output`.
pub fn bundle(host: &Path, files: &BTreeMap<String, PathBuf>, output: &Path) -> anyhow::Result<BundleTrailer> {
    if read_trailer(host)
        .with_context(|| format!("failed to read {}", host.display()))?
        .is_some()
    {
        bail!("{} already carries a bundle", host.display());
    }

    let image = fs::read(host).with_context(|| format!("failed to read {}", host.display()))?;
    let mut contents = Vec::with_capacity(files.len());
    for (name, path) in files {
        let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        contents.push((name.clone(), data));
    }

    let mut bundled = Vec::new();
    let trailer = write_bundle(&mut bundled, &image, &contents)?;
    super::write_executable(output, &bundled, host)?;
    Ok(trailer)
}

pub fn execute(
    out: &mut StyledOutput,
    host: &Path,
    source: &Path,
    output: &Path,
    patterns: &[String],
) -> anyhow::Result<()> {
    let files = collect_files(source, patterns)?;
    if files.is_empty() {
        bail!("no files under {} match {:?}", source.display(), patterns);
    }

    let image = fs::read(host).with_context(|| format!("failed to read {}", host.display()))?;
    if find_placeholder(&image).is_ok() {
        out.warning("Warning", &format!("{} is not bound to an application", host.display()));
    }

    let trailer = bundle(host, &files, output)?;
    for name in files.keys() {
        out.dim(&format!("  {}", name));
    }
    out.status(
        "Bundled",
        &format!("{} files into {} (id {})", files.len(), output.display(), trailer.bundle_id()),
    );
    Ok(())
}
