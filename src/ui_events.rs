// src/ui_events.rs
use crate::preferences::ThemeFlag;
use crate::renderer::{DrawSurface, ParticleRenderer};
use crate::theme::ThemeMode;

/// Commands from the keyboard or from JS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    SetTheme(ThemeMode),
    ToggleTheme,
    /// The host removed the background; stop rendering for good.
    Unmount,
}

/// User events carried by the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    Command(UserCommand),
    /// Async surface creation finished.
    #[cfg(target_arch = "wasm32")]
    SurfaceReady,
}

impl From<UserCommand> for AppEvent {
    fn from(command: UserCommand) -> Self {
        AppEvent::Command(command)
    }
}

/// Applies a command to the theme flag and the renderer. Returns whether the
/// renderer needs a frame scheduled afterwards.
pub fn apply_command<S: DrawSurface>(
    command: UserCommand,
    renderer: &mut ParticleRenderer<S>,
    theme: &mut ThemeFlag,
) -> bool {
    match command {
        UserCommand::SetTheme(mode) => {
            theme.set_preference(mode);
            renderer.set_palette(mode);
            log::info!("Theme set to {}", mode);
            renderer.is_running()
        }
        UserCommand::ToggleTheme => {
            let mode = theme.toggle();
            renderer.set_palette(mode);
            log::info!("Theme toggled to {}", mode);
            renderer.is_running()
        }
        UserCommand::Unmount => {
            renderer.stop();
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldConfig;
    use crate::preferences::{MemoryStore, PreferenceStore, THEME_KEY};
    use crate::scene::FrameGeometry;
    use crate::theme::Palette;

    struct NullSurface;

    impl DrawSurface for NullSurface {
        fn resize(&mut self, _width: u32, _height: u32, _scale_factor: f64) {}
        fn present(&mut self, _geometry: &FrameGeometry, _palette: &Palette) -> Result<(), wgpu::SurfaceError> {
            Ok(())
        }
        fn reconfigure(&mut self) {}
    }

    fn mounted() -> (ParticleRenderer<NullSurface>, ThemeFlag) {
        let theme = ThemeFlag::load(Box::new(MemoryStore::default()));
        let mut renderer = ParticleRenderer::new(FieldConfig::default());
        renderer.start(Some(NullSurface), 640, 480, theme.get_preference());
        (renderer, theme)
    }

    #[test]
    fn test_toggle_repalettes_running_renderer() {
        let (mut renderer, mut theme) = mounted();
        assert_eq!(renderer.mode(), Some(ThemeMode::Dark));

        assert!(apply_command(UserCommand::ToggleTheme, &mut renderer, &mut theme));
        assert_eq!(theme.get_preference(), ThemeMode::Light);
        assert_eq!(renderer.mode(), Some(ThemeMode::Light));
    }

    #[test]
    fn test_set_theme_persists_even_when_unmounted() {
        let mut store = MemoryStore::default();
        store.set(THEME_KEY, "dark").unwrap();
        let mut theme = ThemeFlag::load(Box::new(store));
        let mut renderer: ParticleRenderer<NullSurface> = ParticleRenderer::new(FieldConfig::default());

        assert!(!apply_command(UserCommand::SetTheme(ThemeMode::Light), &mut renderer, &mut theme));
        assert_eq!(theme.get_preference(), ThemeMode::Light);
    }

    #[test]
    fn test_unmount_stops_and_invalidates_queued_frame() {
        let (mut renderer, mut theme) = mounted();
        let queued = renderer.request_frame().unwrap();

        assert!(!apply_command(UserCommand::Unmount, &mut renderer, &mut theme));
        assert!(!renderer.run_frame(queued));
        assert!(renderer.is_stopped());
    }

    #[test]
    fn test_commands_reach_the_loop_as_events() {
        for command in [UserCommand::SetTheme(ThemeMode::Light), UserCommand::ToggleTheme, UserCommand::Unmount] {
            assert_eq!(AppEvent::from(command), AppEvent::Command(command));
        }
    }

    #[test]
    fn test_only_theme_commands_ask_for_frames() {
        let (mut renderer, mut theme) = mounted();
        assert!(apply_command(UserCommand::SetTheme(ThemeMode::Dark), &mut renderer, &mut theme));
        assert!(apply_command(UserCommand::ToggleTheme, &mut renderer, &mut theme));
        assert!(!apply_command(UserCommand::Unmount, &mut renderer, &mut theme));
        // Stopped for good: theme changes still persist but schedule nothing.
        assert!(!apply_command(UserCommand::ToggleTheme, &mut renderer, &mut theme));
        assert_eq!(theme.get_preference(), ThemeMode::Dark);
    }
}
