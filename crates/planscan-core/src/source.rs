//! Page sources: where drawing operations and viewports come from.
//!
//! The pipeline never reads documents itself. A [`PageSource`] hands it one
//! page's [`PageGeometry`] at a requested render scale; failures here are the
//! only errors a detection run reports for its page.

use crate::error::{PlanscanError, Result};
use crate::geometry::Affine;
use crate::ops::{OpCode, Operation, PageGeometry, Viewport};
use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};
use serde::Deserialize;
use std::path::Path;

/// US Letter, used when a page tree carries no `/MediaBox` at all.
const FALLBACK_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Host collaborator that produces page geometry.
pub trait PageSource: Send + Sync {
    fn page_count(&self) -> usize;

    /// Operations and viewport of `page` (0-indexed) at render `scale`.
    ///
    /// # Errors
    ///
    /// [`PlanscanError::PageOutOfRange`] for a bad index,
    /// [`PlanscanError::Source`] when the page cannot be read.
    fn page_geometry(&self, page: usize, scale: f64) -> Result<PageGeometry>;
}

fn check_scale(scale: f64) -> Result<()> {
    if scale.is_finite() && scale > 0.0 {
        Ok(())
    } else {
        Err(PlanscanError::config(format!(
            "render scale must be finite and positive, got {scale}"
        )))
    }
}

/// PDF documents read with `lopdf`.
pub struct LopdfSource {
    doc: Document,
    /// Page object ids in page order
    pages: Vec<ObjectId>,
}

impl std::fmt::Debug for LopdfSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LopdfSource")
            .field("pages", &self.pages.len())
            .finish_non_exhaustive()
    }
}

impl LopdfSource {
    /// # Errors
    ///
    /// [`PlanscanError::Source`] if the file is not a readable PDF.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let doc = Document::load(path).map_err(|e| {
            PlanscanError::source_failure(format!("cannot load {}: {e}", path.display()))
        })?;
        Ok(Self::from_document(doc))
    }

    /// # Errors
    ///
    /// [`PlanscanError::Source`] if the bytes are not a readable PDF.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let doc = Document::load_mem(bytes)
            .map_err(|e| PlanscanError::source_failure(format!("cannot load PDF: {e}")))?;
        Ok(Self::from_document(doc))
    }

    #[must_use]
    pub fn from_document(doc: Document) -> Self {
        let pages = doc.get_pages().into_values().collect();
        Self { doc, pages }
    }

    fn page_id(&self, page: usize) -> Result<ObjectId> {
        self.pages
            .get(page)
            .copied()
            .ok_or(PlanscanError::PageOutOfRange {
                page,
                page_count: self.pages.len(),
            })
    }

    /// `[llx, lly, urx, ury]`, normalised so that `ll` is the lower-left corner.
    fn media_box(&self, page_id: ObjectId) -> Result<[f64; 4]> {
        let Some(object) = resolve_inherited(&self.doc, page_id, b"MediaBox")? else {
            log::debug!("Page {:?} has no MediaBox, assuming US Letter", page_id);
            return Ok(FALLBACK_MEDIA_BOX);
        };
        let array = self
            .deref(object)?
            .as_array()
            .map_err(|e| PlanscanError::source_failure(format!("invalid MediaBox: {e}")))?;
        if array.len() != 4 {
            return Err(PlanscanError::source_failure(format!(
                "MediaBox has {} entries",
                array.len()
            )));
        }
        let mut values = [0.0; 4];
        for (value, object) in values.iter_mut().zip(array) {
            *value = object_to_f64(self.deref(object)?).ok_or_else(|| {
                PlanscanError::source_failure(format!("non-numeric MediaBox entry {object:?}"))
            })?;
        }
        let [x0, y0, x1, y1] = values;
        Ok([x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)])
    }

    fn deref<'a>(&'a self, object: &'a Object) -> Result<&'a Object> {
        match object {
            Object::Reference(id) => self
                .doc
                .get_object(*id)
                .map_err(|e| PlanscanError::source_failure(format!("dangling reference: {e}"))),
            other => Ok(other),
        }
    }
}

impl PageSource for LopdfSource {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_geometry(&self, page: usize, scale: f64) -> Result<PageGeometry> {
        check_scale(scale)?;
        let page_id = self.page_id(page)?;
        let viewport = Viewport::for_media_box(self.media_box(page_id)?, scale);

        let bytes = self
            .doc
            .get_page_content(page_id)
            .map_err(|e| PlanscanError::source_failure(format!("page {page}: {e}")))?;
        let content = Content::decode(&bytes)
            .map_err(|e| PlanscanError::source_failure(format!("page {page}: {e}")))?;

        let mut operations = Vec::with_capacity(content.operations.len());
        for op in &content.operations {
            translate_operator(&op.operator, &op.operands, &mut operations);
        }
        log::debug!(
            "Page {}: {} content operators, {} drawing operations",
            page,
            content.operations.len(),
            operations.len()
        );
        Ok(PageGeometry {
            operations,
            viewport,
        })
    }
}

/// Look up `key` on the page dictionary, walking up `/Parent` links.
fn resolve_inherited<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Result<Option<&'a Object>> {
    let mut current = page_id;
    // A malformed tree could loop; real trees are shallow
    for _ in 0..64 {
        let dict = doc
            .get_object(current)
            .and_then(Object::as_dict)
            .map_err(|e| PlanscanError::source_failure(format!("page dictionary: {e}")))?;
        if let Ok(value) = dict.get(key) {
            return Ok(Some(value));
        }
        match dict.get(b"Parent").and_then(Object::as_reference) {
            Ok(parent) => current = parent,
            Err(_) => return Ok(None),
        }
    }
    Ok(None)
}

fn object_to_f64(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

/// Map one content-stream operator onto drawing operations.
///
/// Non-numeric operands become `NaN` so the extractor skips the operation.
fn translate_operator(operator: &str, operands: &[Object], out: &mut Vec<Operation>) {
    let numbers = || -> Vec<f64> {
        operands
            .iter()
            .map(|o| object_to_f64(o).unwrap_or(f64::NAN))
            .collect()
    };
    match operator {
        "q" => out.push(Operation::save()),
        "Q" => out.push(Operation::restore()),
        "cm" => out.push(Operation::new(OpCode::Transform, numbers())),
        "m" => out.push(Operation::new(OpCode::MoveTo, numbers())),
        "l" => out.push(Operation::new(OpCode::LineTo, numbers())),
        "c" => out.push(Operation::new(OpCode::CurveTo, numbers())),
        "v" => out.push(Operation::new(OpCode::CurveToV, numbers())),
        "y" => out.push(Operation::new(OpCode::CurveToY, numbers())),
        "h" => out.push(Operation::close_path()),
        "re" => out.push(Operation::new(OpCode::Rectangle, numbers())),
        "f" | "F" | "f*" | "S" | "B" | "B*" | "n" => out.push(Operation::end_path()),
        "s" | "b" | "b*" => {
            out.push(Operation::close_path());
            out.push(Operation::end_path());
        }
        "Do" => log::debug!("Skipping XObject {:?}", operands.first()),
        _ => {}
    }
}

/// In-memory pages, typically loaded from a JSON operation list.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    pages: Vec<PageGeometry>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StaticDocument {
    Pages(Vec<PageGeometry>),
    Wrapped { pages: Vec<PageGeometry> },
    Single(PageGeometry),
}

impl StaticSource {
    /// Pages whose viewports are at scale 1.
    #[must_use]
    pub fn new(pages: Vec<PageGeometry>) -> Self {
        Self { pages }
    }

    /// Parse a JSON page list: an array of pages, `{"pages": [...]}`, or a
    /// single page object.
    ///
    /// # Errors
    ///
    /// [`PlanscanError::Source`] if the JSON does not describe pages.
    pub fn from_json(json: &str) -> Result<Self> {
        let document: StaticDocument = serde_json::from_str(json)
            .map_err(|e| PlanscanError::source_failure(format!("invalid operation list: {e}")))?;
        Ok(Self::new(match document {
            StaticDocument::Pages(pages) | StaticDocument::Wrapped { pages } => pages,
            StaticDocument::Single(page) => vec![page],
        }))
    }

    /// # Errors
    ///
    /// [`PlanscanError::Io`] if the file cannot be read,
    /// [`PlanscanError::Source`] if it is not a page list.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

impl PageSource for StaticSource {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_geometry(&self, page: usize, scale: f64) -> Result<PageGeometry> {
        check_scale(scale)?;
        let stored = self.pages.get(page).ok_or(PlanscanError::PageOutOfRange {
            page,
            page_count: self.pages.len(),
        })?;
        let stored_scale = if stored.viewport.scale > 0.0 {
            stored.viewport.scale
        } else {
            1.0
        };
        let factor = scale / stored_scale;
        Ok(PageGeometry {
            operations: stored.operations.clone(),
            viewport: Viewport {
                transform: Affine::scale(factor).multiply(&stored.viewport.transform),
                width: stored.viewport.width * factor,
                height: stored.viewport.height * factor,
                scale,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use lopdf::content::Operation as PdfOperation;
    use lopdf::{dictionary, Stream};

    fn one_page_pdf(operations: Vec<PdfOperation>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_lopdf_source_inherited_media_box() {
        let bytes = one_page_pdf(vec![
            PdfOperation::new("re", vec![100.into(), 200.into(), 40.into(), 40.into()]),
            PdfOperation::new("f", vec![]),
        ]);
        let source = LopdfSource::from_bytes(&bytes).unwrap();
        assert_eq!(source.page_count(), 1);

        let geometry = source.page_geometry(0, 2.0).unwrap();
        assert_eq!(geometry.viewport.width, 1224.0);
        assert_eq!(geometry.viewport.height, 1584.0);
        assert_eq!(
            geometry.operations,
            vec![
                Operation::rectangle(100.0, 200.0, 40.0, 40.0),
                Operation::end_path()
            ]
        );
        let top_left = geometry.viewport.transform.apply(Point::new(0.0, 792.0));
        assert_eq!(top_left, Point::new(0.0, 0.0));
    }

    #[test]
    fn test_closing_paint_operators_close_then_end() {
        let mut out = Vec::new();
        translate_operator("b*", &[], &mut out);
        assert_eq!(out, vec![Operation::close_path(), Operation::end_path()]);
    }

    #[test]
    fn test_non_numeric_operand_is_skipped_later() {
        let mut out = Vec::new();
        translate_operator("m", &[Object::Name(b"x".to_vec()), 1.into()], &mut out);
        assert!(out[0].decode().is_none());
    }

    #[test]
    fn test_unreadable_bytes_are_source_errors() {
        let err = LopdfSource::from_bytes(b"not a pdf").unwrap_err();
        assert!(err.is_source_error());
    }

    #[test]
    fn test_page_out_of_range() {
        let source = StaticSource::default();
        let err = source.page_geometry(3, 1.0).unwrap_err();
        assert!(matches!(
            err,
            PlanscanError::PageOutOfRange {
                page: 3,
                page_count: 0
            }
        ));
    }

    #[test]
    fn test_static_source_rescales_viewport() {
        let json = r#"{"operations":[{"op":"rectangle","operands":[10,20,30,30]}],
                       "viewport":{"transform":[1,0,0,1,0,0],"width":500,"height":400}}"#;
        let source = StaticSource::from_json(json).unwrap();
        let geometry = source.page_geometry(0, 1.5).unwrap();
        assert_eq!(geometry.viewport.width, 750.0);
        assert_eq!(geometry.viewport.scale, 1.5);
        assert_eq!(
            geometry.viewport.transform.apply(Point::new(10.0, 20.0)),
            Point::new(15.0, 30.0)
        );
    }
}
