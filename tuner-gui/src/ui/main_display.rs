//! # Main Display Module
//!
//! Layout of the tuner window: note readout and offset meter, spectrum,
//! and a sidebar with microphone, device and chord controls.

use iced::widget::{
    button, column, container, horizontal_space, pick_list, row, text, text_input, Space,
};
use iced::{Alignment, Color, Element, Length};
use tuner_core::devices::PermissionState;

use crate::widgets::{offset_meter, spectrogram};
use crate::{AppDisplayData, Message};

const STATUS_OK: Color = Color::from_rgb(0.6, 0.6, 0.6);
const STATUS_ERROR: Color = Color::from_rgb(1.0, 0.4, 0.4);

/// Creates the complete main application view
pub fn create_main_view(data: &AppDisplayData) -> Element<'static, Message> {
    let title = text("Tuner").size(28);

    let main_content = row![
        column![
            title,
            Space::with_height(20),
            create_note_panel(data),
            Space::with_height(10),
            create_spectrogram_panel(data),
        ]
        .width(Length::Fill)
        .spacing(10),
        Space::with_width(10),
        create_sidebar(data),
    ]
    .align_y(Alignment::Start)
    .padding(20);

    container(main_content)
        .width(Length::Fill)
        .height(Length::Fill)
        .into()
}

/// Detected note, its frequency, and the offset meter.
fn create_note_panel(data: &AppDisplayData) -> Element<'static, Message> {
    let note_text = data.note_name.clone().unwrap_or_else(|| "--".to_string());
    let freq_text = data
        .detected_hz
        .map(|f| format!("{:.2} Hz", f))
        .unwrap_or_else(|| "-- Hz".to_string());
    let offset_text = data
        .offset_hz
        .map(|o| format!("{:+.2} Hz", o))
        .unwrap_or_default();

    let content = column![
        row![
            text("Note").size(14),
            horizontal_space(),
            text("Offset").size(14),
        ],
        Space::with_height(5),
        row![
            text(note_text).size(32),
            Space::with_width(10),
            text(freq_text).size(24),
            horizontal_space(),
            text(offset_text).size(20),
        ]
        .align_y(Alignment::Center),
        Space::with_height(10),
        offset_meter::OffsetMeter::new(data.offset_hz).view(),
    ]
    .spacing(5);

    container(
        column![text("Tuner").size(18), Space::with_height(10), content]
            .spacing(5)
            .padding(15),
    )
    .width(Length::Fill)
    .height(Length::Fixed(200.0))
    .into()
}

fn create_spectrogram_panel(data: &AppDisplayData) -> Element<'static, Message> {
    let content = container(spectrogram::Spectrogram::new(data.spectrum.clone()).view())
        .width(Length::Fill)
        .height(Length::Fill);

    container(
        column![text("Spectrum").size(18), Space::with_height(10), content]
            .spacing(5)
            .padding(15),
    )
    .width(Length::Fill)
    .height(Length::Fixed(250.0))
    .into()
}

/// Microphone, device picker, start/stop and chord playback controls.
fn create_sidebar(data: &AppDisplayData) -> Element<'static, Message> {
    let status_color = match data.permission {
        PermissionState::Denied => STATUS_ERROR,
        _ => STATUS_OK,
    };
    let status = text(data.status.clone()).size(14).color(status_color);

    let mut sections = column![text("Microphone").size(18), status].spacing(10);

    sections = match data.permission {
        PermissionState::Granted => sections
            .push(
                pick_list(
                    data.devices.clone(),
                    data.selected_device.clone(),
                    Message::DeviceSelected,
                )
                .placeholder("Default input")
                .width(Length::Fill),
            )
            .push(if data.listening {
                sidebar_button("Stop Tuner", Message::Stop)
            } else {
                sidebar_button("Start Tuner", Message::Start)
            })
            .push(sidebar_button("Disconnect", Message::Disconnect)),
        // A denied microphone can be retried: asking again re-runs the prompt.
        PermissionState::Prompt | PermissionState::Denied => {
            sections.push(sidebar_button("Connect Microphone", Message::Connect))
        }
    };

    sections = sections
        .push(Space::with_height(20))
        .push(create_chord_section(data))
        .push(Space::with_height(20))
        .push(sidebar_button("Exit", Message::Exit));

    container(sections.padding(15))
        .width(Length::Fixed(280.0))
        .height(Length::Fill)
        .into()
}

/// Free text input; every chord symbol found in it becomes a play button.
fn create_chord_section(data: &AppDisplayData) -> Element<'static, Message> {
    let input = text_input("e.g. Am F C G7", &data.chord_text)
        .on_input(Message::ChordTextChanged)
        .padding(6)
        .size(14);

    let chords = data.chord_symbols.iter().fold(row![].spacing(6), |row, symbol| {
        row.push(
            button(text(symbol.clone()).size(14))
                .padding([4, 8])
                .on_press(Message::PlayChord(symbol.clone())),
        )
    });

    let mut section = column![text("Chords").size(18), input, chords].spacing(8);
    if let Some(feedback) = &data.chord_feedback {
        section = section.push(text(feedback.clone()).size(14));
    }
    section.into()
}

fn sidebar_button(label: &'static str, message: Message) -> Element<'static, Message> {
    button(text(label).size(14).width(Length::Fill))
        .padding([6, 10])
        .on_press(message)
        .width(Length::Fill)
        .into()
}
