//! # Spectrogram Widget
//!
//! Bar chart of the analyser's dB magnitude spectrum, one bar per bin.

use iced::widget::canvas::{self, Geometry, Path};
use iced::widget::container;
use iced::{mouse, Color, Element, Point, Rectangle, Renderer, Size, Theme};

/// Magnitudes at or below this level draw nothing.
const FLOOR_DB: f32 = -140.0;
/// Magnitude drawn at full height.
const CEILING_DB: f32 = -20.0;

pub struct Spectrogram {
    /// Magnitude per bin, in dB (may contain `-inf`)
    data: Vec<f32>,
}

impl Spectrogram {
    pub fn new(data: Vec<f32>) -> Self {
        Self { data }
    }

    pub fn view(self) -> Element<'static, crate::Message> {
        container(
            canvas::Canvas::new(self)
                .width(iced::Length::Fill)
                .height(iced::Length::Fill),
        )
        .into()
    }
}

/// Fraction of the full height a bin of `magnitude_db` fills.
fn bar_fraction(magnitude_db: f32) -> f32 {
    if !magnitude_db.is_finite() {
        return 0.0;
    }
    ((magnitude_db - FLOOR_DB) / (CEILING_DB - FLOOR_DB)).clamp(0.0, 1.0)
}

impl<Message> canvas::Program<Message> for Spectrogram {
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

        if !bounds.width.is_finite() || !bounds.height.is_finite() || self.data.is_empty() {
            return vec![frame.into_geometry()];
        }

        let bar_width = bounds.width / self.data.len() as f32;

        for (i, &magnitude) in self.data.iter().enumerate() {
            let height = bar_fraction(magnitude) * bounds.height;
            if height > 0.0 {
                let bar = Path::rectangle(
                    Point::new(i as f32 * bar_width, bounds.height - height),
                    Size::new(bar_width.max(1.0), height),
                );
                frame.fill(&bar, Color::from_rgb8(0x34, 0x98, 0xDB));
            }
        }

        vec![frame.into_geometry()]
    }
}
