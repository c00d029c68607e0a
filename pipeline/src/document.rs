//! The export artifact: ordered page rasters, writable as one PDF.
//!
//! Each page keeps its own pixel size. The PDF gets one page per raster with
//! a MediaBox of exactly `width x height` points, so mixed page sizes survive
//! the round trip. Rasters are embedded as JPEG (`DCTDecode`) image XObjects
//! drawn to fill their page.

#[cfg(test)]
#[path = "document_test.rs"]
mod document_test;

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbaImage};
use lopdf::{Dictionary, Document as PdfDocument, Object, Stream};

use crate::error::PdfError;

const JPEG_QUALITY: u8 = 90;

/// One rasterised page.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentPage {
    pub page_no: u32,
    pub raster: RgbaImage,
}

impl DocumentPage {
    #[must_use]
    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.raster.height()
    }
}

/// Pages in ascending `page_no` order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub pages: Vec<DocumentPage>,
}

impl Document {
    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    #[must_use]
    pub fn page_numbers(&self) -> Vec<u32> {
        self.pages.iter().map(|p| p.page_no).collect()
    }

    /// Serialise as a PDF, one page per raster in document order.
    ///
    /// # Errors
    ///
    /// [`PdfError::Empty`] for a document without pages, otherwise encoding
    /// or serialisation failures.
    pub fn to_pdf(&self) -> Result<Vec<u8>, PdfError> {
        if self.pages.is_empty() {
            return Err(PdfError::Empty);
        }

        let mut pdf = PdfDocument::with_version("1.5");
        let pages_id = pdf.new_object_id();

        let mut kids = Vec::with_capacity(self.pages.len());
        for page in &self.pages {
            let objects = add_page(&mut pdf, page)?;
            let mut dict = page_dictionary(page);
            dict.set("Parent", Object::Reference(pages_id));
            dict.set("Resources", Object::Dictionary(resources(objects.image)));
            dict.set("Contents", Object::Reference(objects.contents));
            kids.push(Object::Reference(pdf.add_object(Object::Dictionary(dict))));
        }

        let mut pages = Dictionary::new();
        pages.set("Type", Object::Name(b"Pages".to_vec()));
        pages.set("Count", Object::Integer(i64::try_from(kids.len()).unwrap_or(i64::MAX)));
        pages.set("Kids", Object::Array(kids));
        pdf.objects.insert(pages_id, Object::Dictionary(pages));

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog.set("Pages", Object::Reference(pages_id));
        let catalog_id = pdf.add_object(Object::Dictionary(catalog));
        pdf.trailer.set("Root", Object::Reference(catalog_id));

        let mut out = Vec::new();
        pdf.save_to(&mut out)?;
        Ok(out)
    }
}

struct PageObjects {
    image: lopdf::ObjectId,
    contents: lopdf::ObjectId,
}

fn add_page(pdf: &mut PdfDocument, page: &DocumentPage) -> Result<PageObjects, PdfError> {
    let jpeg = encode_jpeg(page)?;

    let mut image = Dictionary::new();
    image.set("Type", Object::Name(b"XObject".to_vec()));
    image.set("Subtype", Object::Name(b"Image".to_vec()));
    image.set("Width", Object::Integer(i64::from(page.width())));
    image.set("Height", Object::Integer(i64::from(page.height())));
    image.set("ColorSpace", Object::Name(b"DeviceRGB".to_vec()));
    image.set("BitsPerComponent", Object::Integer(8));
    image.set("Filter", Object::Name(b"DCTDecode".to_vec()));
    let image_id = pdf.add_object(Object::Stream(Stream::new(image, jpeg)));

    // Scale the unit square to the page and paint the image into it.
    let ops = format!("q {} 0 0 {} 0 0 cm /Im0 Do Q", page.width(), page.height());
    let contents_id = pdf.add_object(Object::Stream(Stream::new(Dictionary::new(), ops.into_bytes())));

    Ok(PageObjects { image: image_id, contents: contents_id })
}

fn page_dictionary(page: &DocumentPage) -> Dictionary {
    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"Page".to_vec()));
    dict.set(
        "MediaBox",
        Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(i64::from(page.width())),
            Object::Integer(i64::from(page.height())),
        ]),
    );
    dict
}

fn resources(image_id: lopdf::ObjectId) -> Dictionary {
    let mut xobjects = Dictionary::new();
    xobjects.set("Im0", Object::Reference(image_id));
    let mut resources = Dictionary::new();
    resources.set("XObject", Object::Dictionary(xobjects));
    resources
}

/// JPEG has no alpha channel; rendered pages are opaque, so dropping it is lossless.
fn encode_jpeg(page: &DocumentPage) -> Result<Vec<u8>, PdfError> {
    let rgb = DynamicImage::ImageRgba8(page.raster.clone()).to_rgb8();
    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|source| PdfError::Encode { page_no: page.page_no, source })?;
    Ok(out.into_inner())
}
