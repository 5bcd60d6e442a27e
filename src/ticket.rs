//! Entry-pass rendering.
//!
//! A ticket is a single A5 page carrying the participant details and a QR
//! code. The QR payload is `"<EVENT>:<registration uuid>"`; gate scanners
//! split on the first `:` and look the registration up by id, so the shape
//! must stay stable.

use anyhow::{Context, Result};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use qrcode::{Color, QrCode};
use uuid::Uuid;

use crate::config::EventInfo;
use crate::models::Registration;

pub const TICKET_CONTENT_TYPE: &str = "application/pdf";

const MM: f32 = 72.0 / 25.4;
const PAGE_WIDTH_MM: f32 = 148.0;
const PAGE_HEIGHT_MM: f32 = 210.0;
const QR_SIZE_MM: f32 = 40.0;

type Rgb = (u8, u8, u8);

const BLACK: Rgb = (10, 10, 10);
const NAVY: Rgb = (27, 38, 59);
const GOLD: Rgb = (212, 175, 55);
const PALE_GOLD: Rgb = (244, 228, 166);
const GREY: Rgb = (150, 150, 150);
const WHITE: Rgb = (250, 250, 250);

#[derive(Debug, Clone)]
pub struct Ticket {
    pub filename: String,
    pub qr_payload: String,
    pub bytes: Vec<u8>,
}

pub fn qr_payload(event: &EventInfo, registration_id: Uuid) -> String {
    format!("{}:{}", event.name.trim().to_uppercase(), registration_id)
}

pub fn attachment_filename(event: &EventInfo, registration: &Registration) -> String {
    format!("{}-Ticket-{}.pdf", event.name.trim(), registration.short_id())
}

pub fn render_ticket(registration: &Registration, event: &EventInfo) -> Result<Ticket> {
    let payload = qr_payload(event, registration.id);
    let qr = QrCode::new(payload.as_bytes()).context("failed to encode ticket QR code")?;

    let mut canvas = Canvas::new(PAGE_WIDTH_MM, PAGE_HEIGHT_MM);
    let (width, height) = (PAGE_WIDTH_MM, PAGE_HEIGHT_MM);

    canvas.fill_rect(BLACK, 0.0, 0.0, width, height);
    canvas.stroke_rect(GOLD, 2.0, 5.0, 5.0, width - 10.0, height - 10.0);
    canvas.stroke_rect(GOLD, 0.5, 8.0, 8.0, width - 16.0, height - 16.0);
    canvas.fill_rect(NAVY, 10.0, 10.0, width - 20.0, 35.0);

    canvas.text_centered(Font::Bold, 28.0, GOLD, 28.0, &event.name);
    canvas.text_centered(Font::Regular, 10.0, PALE_GOLD, 38.0, &event.tagline);
    canvas.text_centered(Font::Bold, 14.0, GOLD, 55.0, "ENTRY PASS");
    canvas.line(GOLD, 0.3, 30.0, 60.0, width - 30.0, 60.0);

    let left = 15.0;
    let right = left + 55.0;
    let mut y = 72.0;

    canvas.label(left, y, "PARTICIPANT NAME");
    canvas.text(Font::Bold, 14.0, WHITE, left, y + 7.0, &registration.name.to_uppercase());

    y += 20.0;
    canvas.label(left, y, "REGISTRATION ID");
    canvas.text(Font::Bold, 11.0, GOLD, left, y + 7.0, &registration.short_id());
    canvas.label(right, y, "COLLEGE / ROLL NO");
    canvas.text(Font::Regular, 10.0, WHITE, right, y + 7.0, &registration.roll_college);

    y += 25.0;
    canvas.label(left, y, "DATE");
    canvas.text(Font::Regular, 10.0, WHITE, left, y + 7.0, &event.date);
    canvas.label(right, y, "TIME");
    canvas.text(Font::Regular, 10.0, WHITE, right, y + 7.0, &event.time);

    y += 20.0;
    canvas.label(left, y, "VENUE");
    canvas.text(Font::Regular, 10.0, WHITE, left, y + 7.0, &event.venue);

    y += 25.0;
    canvas.fill_rect(NAVY, width / 2.0 - 25.0, y - 5.0, 50.0, 55.0);
    canvas.qr(&qr, GOLD, width / 2.0 - QR_SIZE_MM / 2.0, y, QR_SIZE_MM);
    canvas.text_centered(Font::Regular, 7.0, GREY, y + 47.0, "Scan for verification");

    canvas.line(GOLD, 0.3, 30.0, height - 25.0, width - 30.0, height - 25.0);
    canvas.text_centered(
        Font::Regular,
        8.0,
        GREY,
        height - 18.0,
        "This pass is non-transferable. Please carry a valid ID.",
    );
    canvas.text_centered(Font::Regular, 9.0, GOLD, height - 12.0, &event.location);

    let bytes = canvas.into_pdf()?;

    Ok(Ticket {
        filename: attachment_filename(event, registration),
        qr_payload: payload,
        bytes,
    })
}

#[derive(Clone, Copy)]
enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }

    /// Average Helvetica advance per em; good enough to centre short lines.
    fn average_advance(self) -> f32 {
        match self {
            Font::Regular => 0.52,
            Font::Bold => 0.58,
        }
    }
}

/// Drawing surface in millimetres with a top-left origin, the way the
/// layout above is written. Converts to PDF user space on emit.
struct Canvas {
    width_mm: f32,
    height_mm: f32,
    ops: Vec<Operation>,
}

impl Canvas {
    fn new(width_mm: f32, height_mm: f32) -> Self {
        Self {
            width_mm,
            height_mm,
            ops: Vec::new(),
        }
    }

    fn x(&self, mm: f32) -> f32 {
        mm * MM
    }

    fn y(&self, mm: f32) -> f32 {
        (self.height_mm - mm) * MM
    }

    fn fill_color(&mut self, (r, g, b): Rgb) {
        self.ops.push(Operation::new("rg", rgb_operands(r, g, b)));
    }

    fn stroke_color(&mut self, (r, g, b): Rgb) {
        self.ops.push(Operation::new("RG", rgb_operands(r, g, b)));
    }

    fn rect_op(&self, x: f32, y: f32, w: f32, h: f32) -> Operation {
        Operation::new(
            "re",
            vec![
                self.x(x).into(),
                self.y(y + h).into(),
                (w * MM).into(),
                (h * MM).into(),
            ],
        )
    }

    fn fill_rect(&mut self, color: Rgb, x: f32, y: f32, w: f32, h: f32) {
        self.fill_color(color);
        let rect = self.rect_op(x, y, w, h);
        self.ops.push(rect);
        self.ops.push(Operation::new("f", vec![]));
    }

    fn stroke_rect(&mut self, color: Rgb, line_width_mm: f32, x: f32, y: f32, w: f32, h: f32) {
        self.stroke_color(color);
        self.ops
            .push(Operation::new("w", vec![(line_width_mm * MM).into()]));
        let rect = self.rect_op(x, y, w, h);
        self.ops.push(rect);
        self.ops.push(Operation::new("S", vec![]));
    }

    fn line(&mut self, color: Rgb, line_width_mm: f32, x1: f32, y1: f32, x2: f32, y2: f32) {
        self.stroke_color(color);
        self.ops
            .push(Operation::new("w", vec![(line_width_mm * MM).into()]));
        self.ops
            .push(Operation::new("m", vec![self.x(x1).into(), self.y(y1).into()]));
        self.ops
            .push(Operation::new("l", vec![self.x(x2).into(), self.y(y2).into()]));
        self.ops.push(Operation::new("S", vec![]));
    }

    fn text(&mut self, font: Font, size_pt: f32, color: Rgb, x: f32, y: f32, value: &str) {
        let (px, py) = (self.x(x), self.y(y));
        self.ops.push(Operation::new("BT", vec![]));
        self.fill_color(color);
        self.ops.push(Operation::new(
            "Tf",
            vec![font.resource().into(), size_pt.into()],
        ));
        self.ops
            .push(Operation::new("Td", vec![px.into(), py.into()]));
        self.ops.push(Operation::new(
            "Tj",
            vec![Object::string_literal(win_ansi_bytes(value))],
        ));
        self.ops.push(Operation::new("ET", vec![]));
    }

    fn text_centered(&mut self, font: Font, size_pt: f32, color: Rgb, y: f32, value: &str) {
        let text_width_mm = value.chars().count() as f32 * size_pt * font.average_advance() / MM;
        let x = ((self.width_mm - text_width_mm) / 2.0).max(0.0);
        self.text(font, size_pt, color, x, y, value);
    }

    fn label(&mut self, x: f32, y: f32, value: &str) {
        self.text(Font::Regular, 9.0, GREY, x, y, value);
    }

    fn qr(&mut self, code: &QrCode, color: Rgb, x: f32, y: f32, size_mm: f32) {
        let modules = code.width();
        if modules == 0 {
            return;
        }
        let module_mm = size_mm / modules as f32;
        self.fill_color(color);
        for (index, module) in code.to_colors().into_iter().enumerate() {
            if module != Color::Dark {
                continue;
            }
            let col = (index % modules) as f32;
            let row = (index / modules) as f32;
            let rect = self.rect_op(
                x + col * module_mm,
                y + row * module_mm,
                module_mm,
                module_mm,
            );
            self.ops.push(rect);
        }
        self.ops.push(Operation::new("f", vec![]));
    }

    fn into_pdf(self) -> Result<Vec<u8>> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let regular_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let bold_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                Font::Regular.resource() => regular_id,
                Font::Bold.resource() => bold_id,
            },
        });

        let content = Content {
            operations: self.ops,
        };
        let encoded = content
            .encode()
            .context("failed to encode ticket content stream")?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![
                0.into(),
                0.into(),
                (self.width_mm * MM).into(),
                (self.height_mm * MM).into(),
            ],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)
            .context("failed to serialise ticket PDF")?;
        Ok(bytes)
    }
}

fn rgb_operands(r: u8, g: u8, b: u8) -> Vec<Object> {
    [r, g, b]
        .into_iter()
        .map(|component| Object::from(f32::from(component) / 255.0))
        .collect()
}

/// Type1 base fonts only cover Latin-1; anything else becomes `?`.
fn win_ansi_bytes(value: &str) -> Vec<u8> {
    value
        .chars()
        .map(|ch| match u8::try_from(u32::from(ch)) {
            Ok(byte) if !ch.is_control() => byte,
            _ => b'?',
        })
        .collect()
}
