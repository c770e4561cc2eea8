//! Tour manifest tile extraction
//!
//! The manifest nests tiles as `krpano > scene > cube > face > level > tile`.
//! Each `tile` element's `url` attribute becomes one [`TileTask`], stored
//! under `<output>/<scene>/cube/<face>/<level>/<file name>`.

use crate::MirrorError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::{Path, PathBuf};

/// Element path under which tiles are collected
const TILE_PARENTS: [&[u8]; 5] = [b"krpano", b"scene", b"cube", b"face", b"level"];

/// One image tile to download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileTask {
    /// Absolute tile URL
    pub url: String,

    /// Target file; treated as opaque by the downloader
    pub local_path: PathBuf,

    /// The `url` attribute as written in the manifest
    pub relative_path: String,

    pub scene_name: String,
}

impl TileTask {
    /// Short name for log lines
    pub fn display_name(&self) -> &str {
        if self.relative_path.is_empty() {
            &self.url
        } else {
            &self.relative_path
        }
    }
}

/// An open element and the attributes tile extraction cares about
struct OpenElement {
    name: Vec<u8>,
    name_attr: Option<String>,
}

/// Extracts the tile list from manifest XML, in document order
///
/// Relative tile URLs are appended to `tour_base_url`; URLs starting with
/// `http` are kept as they are. Scenes, faces and levels without a `name`
/// attribute fall back to `scene`, `face` and `level`.
///
/// # Errors
///
/// Returns [`MirrorError::Xml`] when the document is not well-formed.
pub fn extract_tiles(
    xml: &str,
    tour_base_url: &str,
    output_dir: &Path,
) -> crate::Result<Vec<TileTask>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<OpenElement> = Vec::new();
    let mut tiles = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if let Some(tile) = tile_from_element(&e, &stack, tour_base_url, output_dir)? {
                    tiles.push(tile);
                }
                stack.push(OpenElement {
                    name: e.local_name().as_ref().to_vec(),
                    name_attr: attribute(&e, b"name")?,
                });
            }
            Event::Empty(e) => {
                if let Some(tile) = tile_from_element(&e, &stack, tour_base_url, output_dir)? {
                    tiles.push(tile);
                }
            }
            Event::End(_) => {
                stack.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    tracing::info!("Found {} tiles in manifest", tiles.len());
    Ok(tiles)
}

/// Reads the manifest at `path` and extracts its tiles
pub async fn parse_manifest_file(
    path: &Path,
    tour_base_url: &str,
    output_dir: &Path,
) -> crate::Result<Vec<TileTask>> {
    let xml = tokio::fs::read_to_string(path).await?;
    extract_tiles(&xml, tour_base_url, output_dir)
}

fn tile_from_element(
    element: &BytesStart<'_>,
    stack: &[OpenElement],
    tour_base_url: &str,
    output_dir: &Path,
) -> crate::Result<Option<TileTask>> {
    if element.local_name().as_ref() != b"tile" || !is_tile_parent(stack) {
        return Ok(None);
    }

    let Some(relative_path) = attribute(element, b"url")? else {
        return Ok(None);
    };

    let file_name = relative_path.rsplit('/').next().unwrap_or_default();
    if file_name.is_empty() {
        tracing::debug!("Ignoring tile without a file name: {}", relative_path);
        return Ok(None);
    }

    let url = if relative_path.starts_with("http") {
        relative_path.clone()
    } else {
        format!("{}{}", tour_base_url, relative_path)
    };

    let scene_name = name_or(&stack[1], "scene");
    let local_path = output_dir
        .join(&scene_name)
        .join("cube")
        .join(name_or(&stack[3], "face"))
        .join(name_or(&stack[4], "level"))
        .join(file_name);

    Ok(Some(TileTask {
        url,
        local_path,
        relative_path,
        scene_name,
    }))
}

fn is_tile_parent(stack: &[OpenElement]) -> bool {
    stack.len() == TILE_PARENTS.len()
        && stack
            .iter()
            .zip(TILE_PARENTS)
            .all(|(open, expected)| open.name == expected)
}

fn name_or(element: &OpenElement, default: &str) -> String {
    element
        .name_attr
        .clone()
        .unwrap_or_else(|| default.to_string())
}

fn attribute(element: &BytesStart<'_>, key: &[u8]) -> crate::Result<Option<String>> {
    for attr in element.attributes().flatten() {
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}
