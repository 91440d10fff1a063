//! UI module for the mockup control panel using egui
//!
//! Implements a single left side panel: binding format, thickness, artwork
//! per surface, pose, stacking, backdrop and export. Rendering the panel
//! never touches the scene; it returns `UiAction`s for the app to apply.

use book_mockup::config::CONFIG;
use book_mockup::{BookFormat, Pose, SurfaceRole};
use egui::{Color32, RichText, Vec2};

const ACCENT: Color32 = Color32::from_rgb(79, 70, 229);
const DANGER: Color32 = Color32::from_rgb(239, 68, 68);

/// Backdrop currently selected in the panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundChoice {
    Transparent,
    Solid(u32),
    Wood,
}

impl BackgroundChoice {
    /// Value understood by `SceneComposer::set_background`
    pub fn request(&self) -> String {
        match self {
            BackgroundChoice::Transparent => "transparent".to_string(),
            BackgroundChoice::Solid(color) => format!("#{color:06x}"),
            BackgroundChoice::Wood => "wood".to_string(),
        }
    }

    /// Whether the scene applies this choice only after an image load
    pub fn loads_image(&self) -> bool {
        matches!(self, BackgroundChoice::Wood)
    }
}

/// UI state for the control panel
pub struct UiState {
    /// Whether the panel is open
    pub panel_open: bool,
    pub format: BookFormat,
    /// Thickness shown by the slider
    pub thickness: f32,
    pub pose: Option<Pose>,
    pub background: BackgroundChoice,
    /// Number of books on the stack
    pub stack_len: usize,
    /// Last notable outcome, shown at the bottom of the panel
    pub status: Option<String>,
    /// Whether an export is still encoding
    pub exporting: bool,
    /// Image loads still decoding
    pub loading: usize,
}

impl Default for UiState {
    fn default() -> Self {
        Self::new()
    }
}

impl UiState {
    pub fn new() -> Self {
        Self {
            panel_open: true,
            format: BookFormat::default(),
            thickness: CONFIG.book.thickness,
            pose: None,
            background: BackgroundChoice::Transparent,
            stack_len: 0,
            status: None,
            exporting: false,
            loading: 0,
        }
    }

    pub fn toggle_panel(&mut self) {
        self.panel_open = !self.panel_open;
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some(message.into());
    }
}

/// UI action that can be returned from rendering
#[derive(Debug, Clone, PartialEq)]
pub enum UiAction {
    /// Switch binding format
    SetFormat(BookFormat),
    /// Change book thickness
    SetThickness(f32),
    /// Open a file dialog and load artwork for a surface
    PickTexture(SurfaceRole),
    /// Apply a pose preset
    SetPose(Pose),
    /// Freeze a copy of the book onto the stack
    AddToStack,
    /// Remove every stacked copy
    ClearStack,
    /// Change the backdrop
    SetBackground(BackgroundChoice),
    /// Render and save a PNG
    Export,
    /// Reset the orbit camera
    ResetCamera,
}

fn section_label(ui: &mut egui::Ui, text: &str) {
    ui.label(RichText::new(text).size(11.0).color(Color32::from_gray(150)));
    ui.add_space(6.0);
}

fn choice_button(ui: &mut egui::Ui, text: &str, selected: bool, width: f32) -> egui::Response {
    let button = egui::Button::new(
        RichText::new(text)
            .size(12.0)
            .color(if selected { Color32::WHITE } else { Color32::from_gray(200) }),
    )
    .fill(if selected {
        ACCENT
    } else {
        Color32::from_rgba_unmultiplied(255, 255, 255, 13)
    })
    .min_size(Vec2::new(width, 32.0));
    ui.add(button)
}

fn wide_button(ui: &mut egui::Ui, text: &str, fill: Color32) -> egui::Response {
    let button = egui::Button::new(RichText::new(text).size(14.0).color(Color32::WHITE))
        .fill(fill)
        .min_size(Vec2::new(ui.available_width() - 20.0, 40.0));
    ui.add(button)
}

fn color32(hex: u32) -> Color32 {
    Color32::from_rgb(((hex >> 16) & 0xff) as u8, ((hex >> 8) & 0xff) as u8, (hex & 0xff) as u8)
}

/// Render the control panel
pub fn render_side_panel(ctx: &egui::Context, ui_state: &mut UiState) -> Vec<UiAction> {
    let mut actions = Vec::new();

    // Menu toggle button (always visible)
    egui::Area::new(egui::Id::new("menu_toggle_area"))
        .anchor(egui::Align2::RIGHT_TOP, egui::vec2(-20.0, 20.0))
        .show(ctx, |ui| {
            let button = egui::Button::new(RichText::new("☰").size(24.0).color(Color32::WHITE))
                .fill(ACCENT)
                .min_size(Vec2::new(50.0, 50.0));
            if ui.add(button).clicked() {
                ui_state.toggle_panel();
            }
        });

    if !ui_state.panel_open {
        return actions;
    }

    egui::SidePanel::left("mockup_panel")
        .resizable(false)
        .default_width(280.0)
        .show(ctx, |ui| {
            ui.add_space(10.0);
            ui.horizontal(|ui| {
                ui.add_space(10.0);
                ui.label(RichText::new("📚 Book Mockup").size(18.0).strong().color(Color32::WHITE));
            });
            ui.add_space(10.0);
            ui.separator();
            ui.add_space(10.0);

            egui::ScrollArea::vertical().show(ui, |ui| {
                section_label(ui, "FORMAT");
                ui.horizontal(|ui| {
                    for format in BookFormat::all() {
                        let selected = ui_state.format == *format;
                        if choice_button(ui, format.display_name(), selected, 110.0).clicked() && !selected {
                            actions.push(UiAction::SetFormat(*format));
                        }
                    }
                });
                ui.add_space(15.0);

                section_label(ui, "THICKNESS");
                let slider = egui::Slider::new(
                    &mut ui_state.thickness,
                    CONFIG.ui.min_thickness..=CONFIG.ui.max_thickness,
                )
                .step_by(0.05)
                .fixed_decimals(2);
                if ui.add(slider).changed() {
                    actions.push(UiAction::SetThickness(ui_state.thickness));
                }
                ui.add_space(15.0);

                section_label(ui, "ARTWORK");
                for role in SurfaceRole::ALL {
                    let text = format!("🖼️ {} image...", role.display_name());
                    if choice_button(ui, &text, false, ui.available_width() - 20.0).clicked() {
                        actions.push(UiAction::PickTexture(role));
                    }
                    ui.add_space(4.0);
                }
                if ui_state.loading > 0 {
                    ui.label(
                        RichText::new(format!("⏳ Loading {} image(s)...", ui_state.loading))
                            .size(11.0)
                            .color(Color32::from_gray(170)),
                    );
                }
                ui.add_space(11.0);

                section_label(ui, "POSE");
                ui.horizontal(|ui| {
                    for pose in Pose::all() {
                        let selected = ui_state.pose == Some(*pose);
                        if choice_button(ui, pose.display_name(), selected, 72.0).clicked() {
                            actions.push(UiAction::SetPose(*pose));
                        }
                    }
                });
                ui.add_space(15.0);

                section_label(ui, "STACK");
                ui.label(
                    RichText::new(format!("{} book(s) stacked", ui_state.stack_len))
                        .size(12.0)
                        .color(Color32::from_gray(200)),
                );
                ui.add_space(4.0);
                ui.horizontal(|ui| {
                    if choice_button(ui, "➕ Add to stack", false, 120.0).clicked() {
                        actions.push(UiAction::AddToStack);
                    }
                    let clear = egui::Button::new(RichText::new("🗑️ Clear").size(12.0).color(DANGER))
                        .fill(Color32::from_rgba_unmultiplied(239, 68, 68, 51))
                        .min_size(Vec2::new(100.0, 32.0));
                    if ui.add_enabled(ui_state.stack_len > 0, clear).clicked() {
                        actions.push(UiAction::ClearStack);
                    }
                });
                ui.add_space(15.0);

                section_label(ui, "BACKGROUND");
                ui.horizontal_wrapped(|ui| {
                    let transparent = ui_state.background == BackgroundChoice::Transparent;
                    if choice_button(ui, "None", transparent, 60.0).clicked() {
                        actions.push(UiAction::SetBackground(BackgroundChoice::Transparent));
                    }
                    let wood = ui_state.background == BackgroundChoice::Wood;
                    if choice_button(ui, "Wood", wood, 60.0).clicked() {
                        actions.push(UiAction::SetBackground(BackgroundChoice::Wood));
                    }
                    for (color, name) in CONFIG.ui.solid_backgrounds {
                        let selected = ui_state.background == BackgroundChoice::Solid(*color);
                        let swatch = egui::Button::new("")
                            .fill(color32(*color))
                            .stroke(if selected {
                                egui::Stroke::new(2.0, ACCENT)
                            } else {
                                egui::Stroke::new(1.0, Color32::from_gray(80))
                            })
                            .min_size(Vec2::new(28.0, 28.0));
                        if ui.add(swatch).on_hover_text(*name).clicked() {
                            actions.push(UiAction::SetBackground(BackgroundChoice::Solid(*color)));
                        }
                    }
                });
                ui.add_space(20.0);

                ui.separator();
                ui.add_space(10.0);
                let export_text = if ui_state.exporting { "⏳ Exporting..." } else { "💾 Export PNG" };
                if ui
                    .add_enabled_ui(!ui_state.exporting, |ui| wide_button(ui, export_text, ACCENT))
                    .inner
                    .clicked()
                {
                    actions.push(UiAction::Export);
                }
                ui.add_space(6.0);
                if wide_button(ui, "🎥 Reset camera", Color32::from_gray(80)).clicked() {
                    actions.push(UiAction::ResetCamera);
                }

                if let Some(status) = &ui_state.status {
                    ui.add_space(10.0);
                    ui.label(RichText::new(status).size(11.0).color(Color32::from_gray(170)));
                }

                ui.add_space(20.0);
                ui.separator();
                ui.add_space(10.0);
                ui.label(RichText::new("Controls:").size(12.0).color(Color32::from_gray(150)));
                ui.label(RichText::new("• Drag to orbit").size(11.0).color(Color32::from_gray(120)));
                ui.label(RichText::new("• Scroll to zoom").size(11.0).color(Color32::from_gray(120)));
                ui.label(RichText::new("• Tab to toggle this panel").size(11.0).color(Color32::from_gray(120)));
            });
        });

    actions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_choices_map_to_scene_requests() {
        assert_eq!(BackgroundChoice::Transparent.request(), "transparent");
        assert_eq!(BackgroundChoice::Solid(0x1e293b).request(), "#1e293b");
        assert_eq!(BackgroundChoice::Wood.request(), "wood");
        for choice in [
            BackgroundChoice::Transparent,
            BackgroundChoice::Solid(0xffffff),
            BackgroundChoice::Wood,
        ] {
            assert!(choice.request().parse::<book_mockup::scene::BackgroundRequest>().is_ok());
        }
    }

    #[test]
    fn only_named_backdrops_wait_for_a_load() {
        assert!(BackgroundChoice::Wood.loads_image());
        assert!(!BackgroundChoice::Transparent.loads_image());
        assert!(!BackgroundChoice::Solid(0x000000).loads_image());
    }

    #[test]
    fn panel_starts_open_with_default_book() {
        let state = UiState::new();
        assert!(state.panel_open);
        assert_eq!(state.format, BookFormat::Hardcover);
        assert_eq!(state.thickness, CONFIG.book.thickness);
    }

    #[test]
    fn panel_emits_no_actions_without_input() {
        let ctx = egui::Context::default();
        let mut state = UiState::new();
        let mut actions = Vec::new();
        let _ = ctx.run(egui::RawInput::default(), |ctx| {
            actions = render_side_panel(ctx, &mut state);
        });
        assert!(actions.is_empty());
    }
}
