// ============================================================================
// SignStudio CLI — headless sign rendering via command-line arguments
// ============================================================================
//
// Usage examples:
//   signstudio render -c GHN -t 1114 --sign "Happy Birthday" -o out.png
//   signstudio render -c GHN -t 1114 --text "gm fren" --fill-color "#42a058"
//   signstudio render -c GCC -t 7 --sign GM --upload --gallery-url https://bucket
//   signstudio signs --catalog signs.json
//
// All processing runs synchronously on the current thread.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};

use crate::error::SignError;
use crate::export::{
    GalleryStore, HttpGalleryStore, download_filename, upload_to_gallery, write_download,
};
use crate::geometry::Size;
use crate::nft::{HttpFetcher, RemoteFetcher, RpcTokenSource};
use crate::session::EditorSession;
use crate::signs::{Collection, SignCatalog};
use crate::surface::Raster;
use crate::text::FontStore;
use crate::{log_err, log_info};

/// Default public JSON-RPC endpoint for contract reads.
const DEFAULT_RPC_URL: &str = "https://eth.llamarpc.com";

/// Default location of the sign-catalog configuration document.
const DEFAULT_CATALOG_URL: &str =
    "https://raw.githubusercontent.com/hipposigns/sign-assets/main/catalog.json";

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// SignStudio headless NFT sign renderer.
#[derive(Parser, Debug)]
#[command(
    name = "signstudio",
    about = "Composite signs and stickers onto NFT artwork, headlessly",
    long_about = "Load an NFT's artwork by collection and token id, overlay a premade\n\
                  sign and/or free-form text and image stickers, and export the result\n\
                  as a 2048×2048 PNG — optionally uploading it to the public gallery.\n\n\
                  Example:\n  \
                  signstudio render -c GHN -t 1114 --sign \"Happy Birthday\" -o out.png"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render one token with the given sign / text / sticker overlays.
    Render {
        /// Collection id: GHN or GCC.
        #[arg(short, long)]
        collection: String,

        /// Token id (decimal).
        #[arg(short, long)]
        token: String,

        /// Name of a premade sign from the catalog.
        #[arg(long)]
        sign: Option<String>,

        /// Free-form text overlay content.
        #[arg(long)]
        text: Option<String>,

        /// Text overlay color as #rrggbb.
        #[arg(long, default_value = "#ffffff", value_name = "#RRGGBB")]
        text_color: String,

        /// Text overlay font size in display pixels.
        #[arg(long, default_value_t = 48.0)]
        text_size: f32,

        /// Text overlay font family.
        #[arg(long, default_value = "DejaVu Sans")]
        font: String,

        /// Text overlay rotation in degrees (clockwise).
        #[arg(long, default_value_t = 0.0)]
        text_rotate: f32,

        /// Image sticker file to overlay.
        #[arg(long, value_name = "FILE")]
        sticker: Option<PathBuf>,

        /// Sign-region fill color as #rrggbb.
        #[arg(long, default_value = "#428158", value_name = "#RRGGBB")]
        fill_color: String,

        /// Local sign-catalog JSON file (skips the network fetch).
        #[arg(long, value_name = "FILE")]
        catalog: Option<PathBuf>,

        /// Sign-catalog URL (ignored when --catalog is given).
        #[arg(long, default_value = DEFAULT_CATALOG_URL)]
        catalog_url: String,

        /// JSON-RPC endpoint for the tokenURI contract call.
        #[arg(long, default_value = DEFAULT_RPC_URL)]
        rpc_url: String,

        /// Output PNG path. Defaults to the generated download filename.
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Also upload the result to the gallery bucket.
        #[arg(long)]
        upload: bool,

        /// Gallery bucket base URL (required with --upload).
        #[arg(long, value_name = "URL")]
        gallery_url: Option<String>,

        /// Print per-step timing information.
        #[arg(short, long)]
        verbose: bool,
    },

    /// List the premade signs available in the catalog.
    Signs {
        /// Local sign-catalog JSON file (skips the network fetch).
        #[arg(long, value_name = "FILE")]
        catalog: Option<PathBuf>,

        /// Sign-catalog URL (ignored when --catalog is given).
        #[arg(long, default_value = DEFAULT_CATALOG_URL)]
        catalog_url: String,
    },
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the CLI and return an OS exit code.
/// `0` = success, `1` = the operation failed.
pub fn run(args: CliArgs) -> ExitCode {
    let result = match args.command {
        cmd @ Command::Render { .. } => run_render(cmd),
        Command::Signs {
            catalog,
            catalog_url,
        } => run_signs(catalog.as_deref(), &catalog_url),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            log_err!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_signs(catalog_path: Option<&std::path::Path>, catalog_url: &str) -> Result<(), SignError> {
    let catalog = load_catalog(catalog_path, catalog_url)?;
    for (category, entry) in catalog.all() {
        println!("{:<16} {:<28} {}", category, entry.name, entry.file_name);
    }
    Ok(())
}

fn run_render(command: Command) -> Result<(), SignError> {
    let Command::Render {
        collection,
        token,
        sign,
        text,
        text_color,
        text_size,
        font,
        text_rotate,
        sticker,
        fill_color,
        catalog,
        catalog_url,
        rpc_url,
        output,
        upload,
        gallery_url,
        verbose,
    } = command
    else {
        unreachable!("run_render called with a non-render command");
    };

    let collection = Collection::parse(&collection)?;
    let token_id: u64 = token
        .trim()
        .parse()
        .map_err(|_| SignError::Validation(format!("token id '{}' is not a number", token)))?;
    let fill = parse_hex_color(&fill_color)?;

    if upload && gallery_url.is_none() {
        return Err(SignError::Validation(
            "--upload requires --gallery-url".into(),
        ));
    }

    // Headless display geometry: a square container, mapped 1:4 to the canvas
    let mut session = EditorSession::new(Size::new(512.0, 512.0));
    session.set_fill_color(fill);

    let chain = RpcTokenSource::new(&rpc_url);
    let fetcher = HttpFetcher::new();

    // -- Step 1: Load ------------------------------------------------------
    let step = Instant::now();
    session.load(&chain, &fetcher, collection, token_id)?;
    if verbose {
        println!(
            "loaded {} #{} ({:.0}ms)",
            collection.id(),
            token_id,
            step.elapsed().as_secs_f64() * 1000.0
        );
    }

    // -- Step 2: Overlays --------------------------------------------------
    if let Some(name) = &sign {
        let catalog = load_catalog(catalog.as_deref(), &catalog_url)?;
        session.apply_sign(&catalog, &fetcher, name)?;
        if verbose {
            println!("applied sign '{}'", name);
        }
    }
    if let Some(content) = &text {
        let color = parse_hex_color(&text_color)?;
        let id = session.add_text(content, color, text_size, &font)?;
        if text_rotate != 0.0
            && let Some(o) = session_overlay_mut(&mut session, id)
        {
            o.rotation = text_rotate.to_radians();
        }
    }
    if let Some(path) = &sticker {
        let raster = load_sticker(path)?;
        session.add_sticker(raster, 128.0);
        if verbose {
            println!("added sticker {}", path.display());
        }
    }

    // -- Step 3: Composite + export -----------------------------------------
    let step = Instant::now();
    let mut fonts = FontStore::new();
    let png = session.export_png(&mut fonts)?;
    if verbose {
        println!(
            "composited {} overlay(s) ({:.0}ms)",
            session.overlays().len(),
            step.elapsed().as_secs_f64() * 1000.0
        );
    }

    let sign_label = sign.as_deref().unwrap_or("custom");
    let out_path = output
        .unwrap_or_else(|| PathBuf::from(download_filename(collection, token_id, sign_label)));
    write_download(&png, &out_path)?;
    println!("→ {}", out_path.display());

    // -- Step 4: Gallery upload (optional, single attempt) -------------------
    if upload {
        let store = HttpGalleryStore::new(gallery_url.as_deref().unwrap_or_default());
        let path = upload_to_gallery(&store as &dyn GalleryStore, collection, token_id, &png)?;
        println!("uploaded → {}", path);
        log_info!("gallery upload complete: {}", path);
    }

    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn session_overlay_mut<'a>(
    session: &'a mut EditorSession,
    id: crate::overlay::OverlayId,
) -> Option<&'a mut crate::overlay::Overlay> {
    // Direct property edits go through the stack, the same path the
    // property-editor fields use.
    session.overlays_mut().get_mut(id)
}

fn load_catalog(
    path: Option<&std::path::Path>,
    url: &str,
) -> Result<SignCatalog, SignError> {
    let json = match path {
        Some(p) => std::fs::read_to_string(p)
            .map_err(|e| SignError::Config(format!("read {}: {}", p.display(), e)))?,
        None => {
            let fetcher = HttpFetcher::new();
            fetcher.fetch_text(url)?
        }
    };
    SignCatalog::from_json(&json)
}

fn load_sticker(path: &std::path::Path) -> Result<Raster, SignError> {
    let bytes = std::fs::read(path)
        .map_err(|e| SignError::Validation(format!("read {}: {}", path.display(), e)))?;
    let img = image::load_from_memory(&bytes)
        .map_err(|e| SignError::Decode(format!("{}: {}", path.display(), e)))?
        .into_rgba8();
    // Local files are same-origin by definition
    Ok(Raster::clean(img))
}

/// Parse "#rrggbb" (leading '#' optional) into an RGB triple.
pub fn parse_hex_color(s: &str) -> Result<[u8; 3], SignError> {
    let hex = s.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(SignError::Validation(format!(
            "'{}' is not a #rrggbb color",
            s
        )));
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).unwrap_or(0);
    Ok([channel(0), channel(2), channel(4)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_colors_parse_with_or_without_hash() {
        assert_eq!(parse_hex_color("#428158").unwrap(), [0x42, 0x81, 0x58]);
        assert_eq!(parse_hex_color("FFFFFF").unwrap(), [255, 255, 255]);
        assert!(parse_hex_color("#fff").is_err());
        assert!(parse_hex_color("#zzzzzz").is_err());
    }

    #[test]
    fn cli_parses_a_render_invocation() {
        let args = CliArgs::parse_from([
            "signstudio",
            "render",
            "-c",
            "GHN",
            "-t",
            "1114",
            "--sign",
            "Happy Birthday",
            "-o",
            "out.png",
        ]);
        match args.command {
            Command::Render {
                collection,
                token,
                sign,
                ..
            } => {
                assert_eq!(collection, "GHN");
                assert_eq!(token, "1114");
                assert_eq!(sign.as_deref(), Some("Happy Birthday"));
            }
            _ => panic!("expected render subcommand"),
        }
    }
}
