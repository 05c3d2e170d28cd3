//! `mileage upload`: push a document to the media host and print its URL.
//!
//! User-facing output uses writeln! to stdout (this is a CLI binary, not debug output).

use std::io::{self, Write};
use std::path::PathBuf;

use mileage_client::media::ResourceType;

use crate::context::AppContext;

/// Resource type accepted by the media host.
#[derive(clap::ValueEnum, Debug, Clone, Copy, Default)]
pub enum Resource {
    Image,
    Raw,
    #[default]
    Auto,
}

impl From<Resource> for ResourceType {
    fn from(value: Resource) -> Self {
        match value {
            Resource::Image => Self::Image,
            Resource::Raw => Self::Raw,
            Resource::Auto => Self::Auto,
        }
    }
}

pub async fn run(file: PathBuf, resource: Resource, ctx: &AppContext) -> anyhow::Result<()> {
    if !file.is_file() {
        anyhow::bail!("No such file: {}", file.display());
    }
    let uploaded = ctx.media()?.upload_file(&file, resource.into()).await?;

    let mut out = io::stdout();
    writeln!(out, "  URL:      {}", uploaded.secure_url)?;
    if let Some(id) = &uploaded.public_id {
        writeln!(out, "  ID:       {id}")?;
    }
    if let Some(bytes) = uploaded.bytes {
        writeln!(out, "  Size:     {bytes} bytes")?;
    }
    Ok(())
}
