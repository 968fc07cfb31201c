//! # Offset Meter Widget
//!
//! Horizontal meter showing how far the detected pitch is from the
//! matched note, in Hz. The needle colour signals how close it is.

use iced::widget::canvas::{self, Geometry, Path, Stroke};
use iced::widget::container;
use iced::{mouse, Color, Element, Point, Rectangle, Renderer, Size, Theme};

/// Offset at which the needle reaches the edge of the meter.
const METER_RANGE_HZ: f32 = 5.0;
const IN_TUNE_HZ: f32 = 0.2;
const CLOSE_HZ: f32 = 0.8;

pub struct OffsetMeter {
    /// Offset from the matched note (None when no note is detected)
    offset_hz: Option<f32>,
}

impl OffsetMeter {
    pub fn new(offset_hz: Option<f32>) -> Self {
        Self { offset_hz }
    }

    pub fn view(self) -> Element<'static, crate::Message> {
        container(
            canvas::Canvas::new(self)
                .width(iced::Length::Fill)
                .height(iced::Length::Fixed(60.0)),
        )
        .into()
    }
}

/// Needle colour for an offset.
fn needle_color(offset_hz: f32) -> Color {
    let diff = offset_hz.abs();
    if diff < IN_TUNE_HZ {
        Color::from_rgb8(0x34, 0xDB, 0xD8) // Cyan
    } else if diff < CLOSE_HZ {
        Color::from_rgb8(0x34, 0xDB, 0x98) // Green
    } else {
        Color::from_rgb8(0xFF, 0x33, 0x33) // Red
    }
}

impl<Message> canvas::Program<Message> for OffsetMeter {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = canvas::Frame::new(renderer, bounds.size());

        let background = Path::rectangle(Point::ORIGIN, bounds.size());
        frame.fill(&background, Color::from_rgb8(0x40, 0x40, 0x40));

        // One tick per Hz, the centre one brighter.
        let center_x = bounds.width / 2.0;
        let hz_width = center_x / METER_RANGE_HZ;
        for step in -(METER_RANGE_HZ as i32)..=(METER_RANGE_HZ as i32) {
            let x = center_x + step as f32 * hz_width;
            let (height, color) = if step == 0 {
                (bounds.height, Color::WHITE)
            } else {
                (bounds.height * 0.3, Color::from_rgb8(0x90, 0x90, 0x90))
            };
            let tick = Path::line(Point::new(x, 0.0), Point::new(x, height));
            frame.stroke(&tick, Stroke::default().with_width(2.0).with_color(color));
        }

        if let Some(offset) = self.offset_hz {
            let clamped = offset.clamp(-METER_RANGE_HZ, METER_RANGE_HZ);
            let needle_x = center_x + clamped * hz_width;
            let needle = Path::rectangle(
                Point::new(needle_x - 3.0, 0.0),
                Size::new(6.0, bounds.height),
            );
            frame.fill(&needle, needle_color(offset));
        }

        vec![frame.into_geometry()]
    }
}
