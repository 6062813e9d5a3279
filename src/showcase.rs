//! Showcase: a slideshow that cycles through the stored images.
//!
//! While enabled, every tick checks whether the dwell interval has passed
//! since the last switch. When it has, the next image (by position in the
//! sorted image list) is loaded and handed to the effect engine as an
//! `IMAGE` effect. Past the last image the position wraps back to 0.

use crate::effect::{EffectEngine, EffectKind};
use crate::media::ImageStore;
use crate::pixel::LedSink;

/// Default time each image stays on screen.
pub const DEFAULT_DWELL_MS: u32 = 10_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Showcase {
    enabled: bool,
    index: usize,
    dwell_ms: u32,
    /// `None` until the first switch after enabling, so it happens right away.
    last_switch_ms: Option<u32>,
}

impl Showcase {
    pub fn new(dwell_ms: u32) -> Self {
        Self {
            enabled: false,
            index: 0,
            dwell_ms,
            last_switch_ms: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Position of the next image to show.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn dwell_ms(&self) -> u32 {
        self.dwell_ms
    }

    /// Start the slideshow from the first image.
    pub fn enable(&mut self) {
        self.enabled = true;
        self.index = 0;
        self.last_switch_ms = None;
        tracing::info!("Showcase enabled, {} ms per image", self.dwell_ms);
    }

    pub fn disable(&mut self) {
        if self.enabled {
            tracing::info!("Showcase disabled");
        }
        self.enabled = false;
    }

    /// Switch to the next image if one is due. Returns the name shown.
    ///
    /// Reads at most one image file. An empty store does nothing.
    pub fn tick<S: LedSink>(
        &mut self,
        now_ms: u32,
        store: &ImageStore,
        engine: &mut EffectEngine<S>,
    ) -> Option<String> {
        if !self.enabled {
            return None;
        }

        if let Some(last) = self.last_switch_ms {
            if now_ms.wrapping_sub(last) < self.dwell_ms {
                return None;
            }
        }
        self.last_switch_ms = Some(now_ms);

        let found = match store.image_by_index(self.index) {
            Ok(None) if self.index > 0 => {
                self.index = 0;
                store.image_by_index(0)
            }
            other => other,
        };

        match found {
            Ok(Some((name, payload))) => {
                self.index += 1;
                engine.set_current_effect(EffectKind::Image, &payload);
                tracing::info!("Showcase switched to image {}", name);
                Some(name)
            }
            Ok(None) => {
                tracing::debug!("Showcase has no images to show");
                None
            }
            Err(e) => {
                tracing::warn!("Showcase skipping image {}: {}", self.index, e);
                self.index += 1;
                None
            }
        }
    }
}

impl Default for Showcase {
    fn default() -> Self {
        Self::new(DEFAULT_DWELL_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MatrixGeometry;
    use crate::pixel::tests::RecordingSink;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn setup(images: &[(&str, &str)]) -> (TempDir, ImageStore, EffectEngine<RecordingSink>) {
        let tmp = TempDir::new().unwrap();
        let store = ImageStore::new(tmp.path(), 0);
        for (name, payload) in images {
            store.write_image(name, payload).unwrap();
        }
        let engine = EffectEngine::new(
            MatrixGeometry::new(2, 1, false),
            60.0,
            RecordingSink::default(),
        );
        (tmp, store, engine)
    }

    #[test]
    fn disabled_showcase_does_nothing() {
        let (_tmp, store, mut engine) = setup(&[("a", "FF0000FF0000")]);
        let mut showcase = Showcase::new(100);
        assert_eq!(showcase.tick(0, &store, &mut engine), None);
        assert_eq!(engine.state().kind, EffectKind::Default);
    }

    #[test]
    fn first_switch_is_immediate() {
        let (_tmp, store, mut engine) = setup(&[("a", "FF0000FF0000")]);
        let mut showcase = Showcase::new(100);
        showcase.enable();

        assert_eq!(showcase.tick(5, &store, &mut engine), Some("a".to_string()));
        assert_eq!(engine.state().kind, EffectKind::Image);
        assert_eq!(engine.state().parameters, "FF0000FF0000");
    }

    #[test]
    fn no_switch_before_dwell_elapses() {
        let (_tmp, store, mut engine) = setup(&[("a", "AA"), ("b", "BB")]);
        let mut showcase = Showcase::new(100);
        showcase.enable();

        assert_eq!(showcase.tick(1000, &store, &mut engine), Some("a".to_string()));
        assert_eq!(showcase.tick(1099, &store, &mut engine), None);
        assert_eq!(engine.state().parameters, "AA");
        assert_eq!(showcase.tick(1100, &store, &mut engine), Some("b".to_string()));
        // Exactly one switch per call, even when far overdue.
        assert_eq!(showcase.tick(9000, &store, &mut engine), Some("a".to_string()));
        assert_eq!(showcase.tick(9001, &store, &mut engine), None);
    }

    #[test]
    fn wraps_to_first_image_after_last() {
        let (_tmp, store, mut engine) = setup(&[("c", "CC"), ("a", "AA"), ("b", "BB")]);
        let mut showcase = Showcase::new(10);
        showcase.enable();

        let shown: Vec<Option<String>> = (0..5)
            .map(|i| showcase.tick(i * 10, &store, &mut engine))
            .collect();
        assert_eq!(
            shown,
            ["a", "b", "c", "a", "b"]
                .map(|s| Some(s.to_string()))
                .to_vec()
        );
        assert_eq!(showcase.index(), 2);
    }

    #[test]
    fn wraps_when_images_are_deleted() {
        let (_tmp, store, mut engine) = setup(&[("a", "AA"), ("b", "BB"), ("c", "CC")]);
        let mut showcase = Showcase::new(10);
        showcase.enable();
        showcase.tick(0, &store, &mut engine);
        showcase.tick(10, &store, &mut engine);
        showcase.tick(20, &store, &mut engine);

        store.delete_image("c").unwrap();
        store.delete_image("b").unwrap();
        assert_eq!(showcase.tick(30, &store, &mut engine), Some("a".to_string()));
        assert_eq!(showcase.index(), 1);
    }

    #[test]
    fn empty_store_is_harmless() {
        let (_tmp, store, mut engine) = setup(&[]);
        let mut showcase = Showcase::new(10);
        showcase.enable();
        for i in 0..5 {
            assert_eq!(showcase.tick(i * 10, &store, &mut engine), None);
        }
        assert_eq!(showcase.index(), 0);
        assert_eq!(engine.state().kind, EffectKind::Default);
    }

    #[test]
    fn enable_restarts_from_first_image() {
        let (_tmp, store, mut engine) = setup(&[("a", "AA"), ("b", "BB")]);
        let mut showcase = Showcase::new(10);
        showcase.enable();
        showcase.tick(0, &store, &mut engine);
        showcase.disable();
        assert_eq!(showcase.tick(50, &store, &mut engine), None);

        showcase.enable();
        assert_eq!(showcase.tick(51, &store, &mut engine), Some("a".to_string()));
    }

    #[test]
    fn dwell_survives_counter_wraparound() {
        let (_tmp, store, mut engine) = setup(&[("a", "AA"), ("b", "BB")]);
        let mut showcase = Showcase::new(100);
        showcase.enable();
        showcase.tick(u32::MAX - 10, &store, &mut engine);
        assert_eq!(showcase.tick(50, &store, &mut engine), None);
        assert_eq!(showcase.tick(89, &store, &mut engine), Some("b".to_string()));
    }
}
