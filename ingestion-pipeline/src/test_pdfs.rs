//! Small PDF documents built in memory for tests.
#![allow(clippy::expect_used)]

use std::path::{Path, PathBuf};

use lopdf::{
    content::{Content, Operation},
    dictionary, Dictionary, Document, Object, ObjectId, Stream,
};

const LINE_HEIGHT: i64 = 14;
const TOP_MARGIN: i64 = 780;

/// Builds a PDF whose pages each hold the given lines of text, one text
/// object per line. `info` becomes the document information dictionary.
pub fn build_pdf(pages: &[&[&str]], info: Option<Dictionary>) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = add_pages(&mut doc, pages);
    finish(doc, pages_id, info, None)
}

pub fn pdf_with_pages(pages: &[&[&str]]) -> Vec<u8> {
    build_pdf(pages, None)
}

/// Info dictionary holding the given text entries as literal strings.
pub fn info(entries: &[(&str, &str)]) -> Dictionary {
    let mut dict = Dictionary::new();
    for (key, value) in entries {
        dict.set(*key, Object::string_literal(*value));
    }
    dict
}

/// A structurally valid document whose page tree is empty.
pub fn empty_page_tree() -> Vec<u8> {
    build_pdf(&[], None)
}

/// A document whose trailer declares standard security handler encryption.
pub fn encrypted_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = add_pages(&mut doc, &[&["Secret contents"]]);
    let encrypt = dictionary! {
        "Filter" => "Standard",
        "V" => 1,
        "R" => 2,
        "Length" => 40,
        "O" => Object::string_literal(vec![0x11_u8; 32]),
        "U" => Object::string_literal(vec![0x22_u8; 32]),
        "P" => -44,
    };
    finish(doc, pages_id, None, Some(encrypt))
}

pub fn write_pdf(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("write test pdf");
    path
}

fn add_pages(doc: &mut Document, pages: &[&[&str]]) -> ObjectId {
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for lines in pages {
        let mut operations = Vec::new();
        let mut y = TOP_MARGIN;
        for line in *lines {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
            operations.push(Operation::new("Td", vec![50.into(), y.into()]));
            operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
            operations.push(Operation::new("ET", vec![]));
            y -= LINE_HEIGHT;
        }
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode page content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        kids.push(page_id.into());
    }

    let count = i64::try_from(kids.len()).expect("page count fits");
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    pages_id
}

fn finish(
    mut doc: Document,
    pages_id: ObjectId,
    info: Option<Dictionary>,
    encrypt: Option<Dictionary>,
) -> Vec<u8> {
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    if let Some(info) = info {
        let info_id = doc.add_object(info);
        doc.trailer.set("Info", info_id);
    }
    if let Some(encrypt) = encrypt {
        let encrypt_id = doc.add_object(encrypt);
        doc.trailer.set("Encrypt", encrypt_id);
        doc.trailer.set(
            "ID",
            vec![
                Object::string_literal(vec![0x33_u8; 16]),
                Object::string_literal(vec![0x33_u8; 16]),
            ],
        );
    }

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("serialize test pdf");
    bytes
}
