//! Page rasterisation: every page of an unlocked document to a PNG image.
//!
//! Pages are scaled by `dpi / 72` from PDF user space, so the default 300 DPI
//! renders an A4 page at roughly 2480 × 3508 px. Rendering is synchronous:
//! the document borrows the pdfium bindings and cannot cross an `.await`,
//! so the processor rasterises first and only then enters async OCR with
//! owned PNG bytes.

use crate::error::ExtractionError;
use crate::pipeline::decrypt::Document;
use crate::pipeline::encode::encode_png;
use tracing::{debug, info};

/// One rendered page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    /// 1-based page number.
    pub page_num: usize,
    /// PNG-encoded pixels.
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Rasterise every page of `document` at `dpi`, in page order.
///
/// A zero-page document yields an empty vector; the OCR stage then sees no
/// text and the extractor reports every field as not found.
pub fn rasterize(document: &dyn Document, dpi: u32) -> Result<Vec<PageImage>, ExtractionError> {
    let scale = dpi as f32 / 72.0;
    let total = document.page_count();
    info!("Rasterising {} pages at {} DPI", total, dpi);

    let mut pages = Vec::with_capacity(total);
    for idx in 0..total {
        let page_num = idx + 1;
        let image = document
            .render_page(idx, scale)
            .map_err(|detail| ExtractionError::Rasterisation { page: page_num, detail })?;

        let png = encode_png(&image).map_err(|e| ExtractionError::Encoding {
            page: page_num,
            detail: e.to_string(),
        })?;

        debug!(
            "Rendered page {} → {}x{} px",
            page_num,
            image.width(),
            image.height()
        );
        pages.push(PageImage {
            page_num,
            png,
            width: image.width(),
            height: image.height(),
        });
    }

    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;
    use std::cell::Cell;

    /// Page `n` renders `n × scale` px square so the scale is observable.
    struct SizedDoc {
        pages: usize,
        fail_on: Option<usize>,
        last_scale: Cell<f32>,
    }

    impl Document for SizedDoc {
        fn page_count(&self) -> usize {
            self.pages
        }

        fn render_page(&self, index: usize, scale: f32) -> Result<DynamicImage, String> {
            self.last_scale.set(scale);
            if self.fail_on == Some(index) {
                return Err("bitmap allocation failed".into());
            }
            let side = ((index + 1) as f32 * scale).round() as u32;
            Ok(DynamicImage::new_rgb8(side, side))
        }
    }

    fn doc(pages: usize) -> SizedDoc {
        SizedDoc {
            pages,
            fail_on: None,
            last_scale: Cell::new(0.0),
        }
    }

    #[test]
    fn pages_come_back_in_order_at_scale() {
        let d = doc(3);
        let pages = rasterize(&d, 144).unwrap();
        assert_eq!(
            pages.iter().map(|p| p.page_num).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!((d.last_scale.get() - 2.0).abs() < f32::EPSILON);
        assert_eq!(pages[0].width, 2);
        assert_eq!(pages[2].height, 6);
        assert!(pages.iter().all(|p| p.png.starts_with(b"\x89PNG")));
    }

    #[test]
    fn empty_document_yields_no_pages() {
        assert!(rasterize(&doc(0), 300).unwrap().is_empty());
    }

    #[test]
    fn render_failure_names_page() {
        let mut d = doc(3);
        d.fail_on = Some(1);
        let err = rasterize(&d, 72).unwrap_err();
        assert_eq!(
            err,
            ExtractionError::Rasterisation {
                page: 2,
                detail: "bitmap allocation failed".into()
            }
        );
    }
}
