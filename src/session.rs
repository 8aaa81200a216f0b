// ============================================================================
// EDITOR SESSION — explicit context object owning all mutable editor state
// ============================================================================
//
// One session owns the loaded base artwork, the overlay stack, the gesture
// controller and the single busy flag. There are no ambient globals: every
// operation goes through the session. The busy flag enforces an
// at-most-one-in-flight policy per high-level operation (load / apply /
// export) — while set, new invocations are refused, never queued.

use crate::compositor::{CompositeJob, composite};
use crate::error::SignError;
use crate::export::encode_png;
use crate::geometry::{CANVAS_EDGE, ContainerPoint, Mapper, PercentPoint, Size};
use crate::gesture::{GestureMode, HitTarget, InteractionController};
use crate::log_err;
use crate::nft::{LoadSlot, LoadedToken, RemoteFetcher, TokenSource, load_token};
use crate::overlay::{Overlay, OverlayId, OverlayStack};
use crate::signs::{Collection, SignCatalog, centroid, validate_sign_file};
use crate::surface::Raster;
use crate::text::FontStore;

/// Default sign fill color (a muted wooden-sign green).
pub const DEFAULT_FILL: [u8; 3] = [66, 129, 88];

/// Default width of a freshly applied sign overlay, as a fraction of the
/// sign region's width.
const SIGN_DEFAULT_WIDTH_FRACTION: f32 = 0.92;

pub struct EditorSession {
    container: Size,
    base: Option<LoadedToken>,
    overlays: OverlayStack,
    controller: InteractionController,
    fill_color: [u8; 3],
    sign_name: Option<String>,
    busy: bool,
    load_slot: LoadSlot,
}

impl EditorSession {
    pub fn new(container: Size) -> Self {
        EditorSession {
            container,
            base: None,
            overlays: OverlayStack::new(),
            controller: InteractionController::new(),
            fill_color: DEFAULT_FILL,
            sign_name: None,
            busy: false,
            load_slot: LoadSlot::new(),
        }
    }

    // ---- accessors ----------------------------------------------------------

    pub fn mapper(&self) -> Mapper {
        Mapper::new(self.container)
    }

    /// Record a container resize; stored positions are percentages, so the
    /// layout survives unchanged.
    pub fn set_container(&mut self, container: Size) {
        self.container = container;
    }

    pub fn base(&self) -> Option<&LoadedToken> {
        self.base.as_ref()
    }

    pub fn overlays(&self) -> &OverlayStack {
        &self.overlays
    }

    /// Mutable overlay access for direct property edits (text content, color,
    /// font size, rotation fields). Transform gestures go through the
    /// pointer-event methods instead.
    pub fn overlays_mut(&mut self) -> &mut OverlayStack {
        &mut self.overlays
    }

    pub fn gesture_mode(&self) -> GestureMode {
        self.controller.mode()
    }

    pub fn fill_color(&self) -> [u8; 3] {
        self.fill_color
    }

    pub fn set_fill_color(&mut self, color: [u8; 3]) {
        self.fill_color = color;
    }

    pub fn sign_name(&self) -> Option<&str> {
        self.sign_name.as_deref()
    }

    /// Export is available only once a base image is loaded.
    pub fn can_export(&self) -> bool {
        self.base.is_some()
    }

    // ---- busy gate ------------------------------------------------------------

    fn with_busy<T>(
        &mut self,
        op: &'static str,
        f: impl FnOnce(&mut Self) -> Result<T, SignError>,
    ) -> Result<T, SignError> {
        if self.busy {
            return Err(SignError::Busy(op));
        }
        self.busy = true;
        let out = f(self);
        self.busy = false;
        out
    }

    // ---- high-level operations -----------------------------------------------

    /// Load a token's artwork. On success the base image is replaced
    /// wholesale, all overlays are cleared and any gesture session ends. On
    /// failure the session rolls back to "nothing loaded". A load superseded
    /// by a newer one discards its result instead of committing.
    pub fn load(
        &mut self,
        chain: &dyn TokenSource,
        fetcher: &dyn RemoteFetcher,
        collection: Collection,
        token_id: u64,
    ) -> Result<(), SignError> {
        self.with_busy("load", |session| {
            let generation = session.load_slot.begin();
            match load_token(chain, fetcher, collection, token_id) {
                Ok(loaded) => {
                    if !session.load_slot.may_commit(generation) {
                        // A newer load superseded this one; drop the result
                        return Ok(());
                    }
                    session.base = Some(loaded);
                    session.overlays.clear();
                    session.controller.end_gesture();
                    session.sign_name = None;
                    Ok(())
                }
                Err(e) => {
                    log_err!("load {} #{} failed: {}", collection.id(), token_id, e);
                    session.base = None;
                    session.overlays.clear();
                    session.controller.end_gesture();
                    session.sign_name = None;
                    Err(e)
                }
            }
        })
    }

    /// Apply a premade sign from the catalog as an image overlay anchored at
    /// the sign region's centroid. On any failure the session keeps its last
    /// good state.
    pub fn apply_sign(
        &mut self,
        catalog: &SignCatalog,
        fetcher: &dyn RemoteFetcher,
        name: &str,
    ) -> Result<OverlayId, SignError> {
        self.with_busy("apply", |session| {
            let base = session
                .base
                .as_ref()
                .ok_or_else(|| SignError::Validation("no NFT loaded".into()))?;
            let entry = catalog
                .find(name)
                .ok_or_else(|| SignError::Validation(format!("unknown sign '{}'", name)))?
                .clone();
            validate_sign_file(&entry.file_name)?;

            let url = catalog.image_url(&entry);
            let raster = fetcher.fetch_image(&url)?;

            // Everything that can fail has succeeded; mutate state now
            let collection = base.collection;
            let position = session.default_position(collection);
            let width = session.default_sign_width(collection);
            let mut overlay = Overlay::image(raster, width);
            overlay.position_percent = position;
            let id = session.overlays.push(overlay);
            session.overlays.select(id);
            session.sign_name = Some(entry.name);
            Ok(id)
        })
    }

    /// Add a free-form text overlay at the default anchor.
    pub fn add_text(
        &mut self,
        content: &str,
        color: [u8; 3],
        font_size_px: f32,
        font_family: &str,
    ) -> Result<OverlayId, SignError> {
        if content.trim().is_empty() {
            return Err(SignError::Validation("text overlay is empty".into()));
        }
        let position = match &self.base {
            Some(base) => self.default_position(base.collection),
            None => PercentPoint::CENTER,
        };
        let mut overlay = Overlay::text(
            content.to_string(),
            color,
            font_size_px,
            font_family.to_string(),
        );
        overlay.position_percent = position;
        let id = self.overlays.push(overlay);
        self.overlays.select(id);
        Ok(id)
    }

    /// Add a free-form image sticker at the default anchor.
    pub fn add_sticker(&mut self, raster: Raster, width_px: f32) -> OverlayId {
        let position = match &self.base {
            Some(base) => self.default_position(base.collection),
            None => PercentPoint::CENTER,
        };
        let mut overlay = Overlay::image(raster, width_px);
        overlay.position_percent = position;
        let id = self.overlays.push(overlay);
        self.overlays.select(id);
        id
    }

    pub fn remove_overlay(&mut self, id: OverlayId) {
        if self.controller.target() == Some(id) {
            self.controller.end_gesture();
        }
        self.overlays.remove(id);
    }

    /// Full reset back to "nothing loaded".
    pub fn reset(&mut self) {
        self.base = None;
        self.overlays.clear();
        self.controller.end_gesture();
        self.sign_name = None;
    }

    /// Composite the current state and encode it as PNG bytes. A tainted
    /// surface fails the export but leaves all in-memory state intact.
    pub fn export_png(&mut self, fonts: &mut FontStore) -> Result<Vec<u8>, SignError> {
        self.with_busy("export", |session| {
            let base = session
                .base
                .as_ref()
                .ok_or_else(|| SignError::Validation("no NFT loaded".into()))?;
            let job = CompositeJob {
                base: &base.raster,
                sign_polygon: base.collection.sign_polygon(),
                fill_color: session.fill_color,
                overlays: &session.overlays,
                mapper: Mapper::new(session.container),
            };
            let surface = composite(&job, fonts)?;
            encode_png(&surface.into_image()?)
        })
    }

    // ---- pointer event plumbing ------------------------------------------------

    pub fn pointer_down(&mut self, id: OverlayId, hit: HitTarget, pointer: ContainerPoint) {
        let mapper = self.mapper();
        self.controller
            .pointer_down(&mut self.overlays, &mapper, id, hit, pointer);
    }

    pub fn pointer_move(&mut self, pointer: ContainerPoint) {
        let mapper = self.mapper();
        self.controller
            .pointer_move(&mut self.overlays, &mapper, pointer);
    }

    pub fn pointer_up(&mut self) {
        self.controller.pointer_up();
    }

    pub fn pointer_cancel(&mut self) {
        self.controller.pointer_cancel();
    }

    // ---- defaults ---------------------------------------------------------------

    /// Default overlay anchor: the sign region's centroid, expressed as a
    /// container percentage. Falls back to the container center when the
    /// container has no layout yet.
    fn default_position(&self, collection: Collection) -> PercentPoint {
        if self.container.is_degenerate() {
            return PercentPoint::CENTER;
        }
        let (cx, cy) = centroid(collection.sign_polygon());
        PercentPoint::new(
            cx / CANVAS_EDGE as f32 * 100.0,
            cy / CANVAS_EDGE as f32 * 100.0,
        )
    }

    /// Default applied-sign width in container pixels: most of the sign
    /// region's width, mapped back to display space.
    fn default_sign_width(&self, collection: Collection) -> f32 {
        let polygon = collection.sign_polygon();
        let min_x = polygon.iter().map(|p| p.0).fold(f32::MAX, f32::min);
        let max_x = polygon.iter().map(|p| p.0).fold(f32::MIN, f32::max);
        let region_canvas_w = (max_x - min_x).max(0.0);
        if self.container.is_degenerate() {
            return region_canvas_w * SIGN_DEFAULT_WIDTH_FRACTION;
        }
        let canvas_to_container = self.container.w / CANVAS_EDGE as f32;
        region_canvas_w * canvas_to_container * SIGN_DEFAULT_WIDTH_FRACTION
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    struct MockChain {
        uri: Result<&'static str, ()>,
    }

    impl TokenSource for MockChain {
        fn token_uri(&self, collection: Collection, token_id: u64) -> Result<String, SignError> {
            self.uri.map(|s| s.to_string()).map_err(|_| {
                SignError::Chain(crate::error::ChainError::TokenMissing {
                    collection: collection.id().to_string(),
                    token_id,
                })
            })
        }
    }

    struct MockFetcher {
        image_ok: bool,
    }

    impl RemoteFetcher for MockFetcher {
        fn fetch_metadata(&self, _url: &str) -> Result<crate::nft::TokenMetadata, SignError> {
            Ok(crate::nft::TokenMetadata {
                image: Some("ipfs://QmMock/img.png".into()),
                image_url: None,
                image_url_camel: None,
            })
        }

        fn fetch_image(&self, url: &str) -> Result<Raster, SignError> {
            if self.image_ok {
                Ok(Raster::clean(RgbaImage::from_pixel(
                    64,
                    64,
                    Rgba([80, 80, 80, 255]),
                )))
            } else {
                Err(SignError::Decode(format!("mock decode failure: {}", url)))
            }
        }
    }

    fn catalog() -> SignCatalog {
        SignCatalog::from_json(
            r#"{
                "githubUser": "hipposigns", "githubRepo": "sign-assets",
                "githubBranch": "main", "imageBasePath": "signs",
                "categories": {
                    "Misc": [
                        {"name": "GM", "fileName": "gm.png"},
                        {"name": "Bad Sign", "fileName": "bad.svg"}
                    ]
                }
            }"#,
        )
        .unwrap()
    }

    fn loaded_session() -> EditorSession {
        let mut session = EditorSession::new(Size::new(512.0, 512.0));
        session
            .load(
                &MockChain { uri: Ok("ipfs://QmMeta/1.json") },
                &MockFetcher { image_ok: true },
                Collection::Ghn,
                1114,
            )
            .unwrap();
        session
    }

    #[test]
    fn failed_load_rolls_back_to_nothing_loaded() {
        let mut session = loaded_session();
        session.add_sticker(
            Raster::clean(RgbaImage::new(8, 8)),
            64.0,
        );
        let err = session
            .load(
                &MockChain { uri: Err(()) },
                &MockFetcher { image_ok: true },
                Collection::Ghn,
                999_999,
            )
            .unwrap_err();
        assert!(matches!(err, SignError::Chain(_)));
        assert!(session.base().is_none());
        assert!(session.overlays().is_empty());
        assert!(!session.can_export());
    }

    #[test]
    fn successful_load_clears_overlays_and_gestures() {
        let mut session = loaded_session();
        let id = session.add_sticker(Raster::clean(RgbaImage::new(8, 8)), 64.0);
        session.pointer_down(id, HitTarget::Body, ContainerPoint::new(256.0, 256.0));
        assert_ne!(session.gesture_mode(), GestureMode::Idle);

        session
            .load(
                &MockChain { uri: Ok("https://meta/2.json") },
                &MockFetcher { image_ok: true },
                Collection::Gcc,
                2,
            )
            .unwrap();
        assert!(session.overlays().is_empty());
        assert_eq!(session.gesture_mode(), GestureMode::Idle);
        assert_eq!(session.base().unwrap().collection, Collection::Gcc);
    }

    #[test]
    fn non_png_sign_is_rejected_and_state_is_unchanged() {
        let mut session = loaded_session();
        let before = session.overlays().len();
        let err = session
            .apply_sign(&catalog(), &MockFetcher { image_ok: true }, "Bad Sign")
            .unwrap_err();
        assert!(matches!(err, SignError::Validation(_)));
        assert_eq!(session.overlays().len(), before);
        assert!(session.sign_name().is_none());
    }

    #[test]
    fn failed_sign_fetch_keeps_last_good_state() {
        let mut session = loaded_session();
        let err = session
            .apply_sign(&catalog(), &MockFetcher { image_ok: false }, "GM")
            .unwrap_err();
        assert!(matches!(err, SignError::Decode(_)));
        assert!(session.overlays().is_empty());
    }

    #[test]
    fn apply_sign_anchors_at_the_region_centroid() {
        let mut session = loaded_session();
        let id = session
            .apply_sign(&catalog(), &MockFetcher { image_ok: true }, "GM")
            .unwrap();
        let overlay = session.overlays().get(id).unwrap();
        let (cx, cy) = centroid(Collection::Ghn.sign_polygon());
        let expected = PercentPoint::new(
            cx / CANVAS_EDGE as f32 * 100.0,
            cy / CANVAS_EDGE as f32 * 100.0,
        );
        assert!((overlay.position_percent.x - expected.x).abs() < 1e-3);
        assert!((overlay.position_percent.y - expected.y).abs() < 1e-3);
        assert_eq!(session.sign_name(), Some("GM"));
    }

    #[test]
    fn text_overlay_without_layout_defaults_to_center() {
        // Scenario: container not laid out yet (width/height = 0)
        let mut session = EditorSession::new(Size::new(0.0, 0.0));
        let id = session
            .add_text("gm fren", [255, 255, 255], 32.0, "Arial")
            .unwrap();
        let overlay = session.overlays().get(id).unwrap();
        assert_eq!(overlay.position_percent, PercentPoint::CENTER);
        assert!(!overlay.position_percent.x.is_nan());
    }

    #[test]
    fn busy_flag_refuses_reentrant_operations() {
        let mut session = EditorSession::new(Size::new(512.0, 512.0));
        session.busy = true;
        let err = session.export_png(&mut FontStore::new()).unwrap_err();
        assert!(matches!(err, SignError::Busy("export")));
        let err = session
            .load(
                &MockChain { uri: Ok("x") },
                &MockFetcher { image_ok: true },
                Collection::Ghn,
                1,
            )
            .unwrap_err();
        assert!(matches!(err, SignError::Busy("load")));
        session.busy = false;
    }

    #[test]
    fn export_without_base_is_a_validation_error() {
        let mut session = EditorSession::new(Size::new(512.0, 512.0));
        let err = session.export_png(&mut FontStore::new()).unwrap_err();
        assert!(matches!(err, SignError::Validation(_)));
    }

    #[test]
    fn export_produces_decodable_png_at_canvas_resolution() {
        let mut session = loaded_session();
        session.add_sticker(
            Raster::clean(RgbaImage::from_pixel(16, 16, Rgba([200, 10, 10, 255]))),
            96.0,
        );
        let bytes = session.export_png(&mut FontStore::new()).unwrap();
        let img = image::load_from_memory(&bytes).unwrap();
        assert_eq!(img.width(), CANVAS_EDGE);
        assert_eq!(img.height(), CANVAS_EDGE);
    }

    #[test]
    fn cross_origin_base_blocks_export_but_not_state() {
        struct CrossOriginFetcher;
        impl RemoteFetcher for CrossOriginFetcher {
            fn fetch_metadata(&self, _url: &str) -> Result<crate::nft::TokenMetadata, SignError> {
                Ok(crate::nft::TokenMetadata {
                    image: Some("https://other-origin.example/img.png".into()),
                    image_url: None,
                    image_url_camel: None,
                })
            }
            fn fetch_image(&self, _url: &str) -> Result<Raster, SignError> {
                Ok(Raster::cross_origin(RgbaImage::new(32, 32)))
            }
        }

        let mut session = EditorSession::new(Size::new(512.0, 512.0));
        session
            .load(
                &MockChain { uri: Ok("https://meta/1.json") },
                &CrossOriginFetcher,
                Collection::Ghn,
                1,
            )
            .unwrap();
        let id = session.add_sticker(Raster::clean(RgbaImage::new(8, 8)), 48.0);

        let err = session.export_png(&mut FontStore::new()).unwrap_err();
        assert!(matches!(err, SignError::TaintedSurface));
        // Overlay state must survive the failed export
        assert!(session.overlays().get(id).is_some());
        assert!(session.base().is_some());
    }
}
