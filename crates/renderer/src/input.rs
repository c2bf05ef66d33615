//! Window size and mouse state fed to the renderer, tracked from `winit`
//! window events.

use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, MouseButton, WindowEvent};

use crate::backend::Extent;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct MouseState {
    position: Option<PhysicalPosition<f64>>,
    is_pressed: bool,
}

impl MouseState {
    pub fn handle_cursor_moved(&mut self, position: PhysicalPosition<f64>) {
        self.position = Some(position);
    }

    pub fn handle_button(&mut self, state: ElementState) {
        self.is_pressed = state == ElementState::Pressed;
    }

    pub fn is_pressed(&self) -> bool {
        self.is_pressed
    }

    /// Cursor position in pixels with the origin at the bottom-left corner.
    pub fn as_uniform(&self, height: f32) -> [f32; 2] {
        match self.position {
            Some(pos) => [pos.x as f32, height - pos.y as f32],
            None => [0.0, 0.0],
        }
    }
}

/// What the renderer reads from the window each frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowState {
    size: PhysicalSize<u32>,
    mouse: MouseState,
    size_changed: bool,
}

impl WindowState {
    pub fn new(size: PhysicalSize<u32>) -> Self {
        Self {
            size,
            mouse: MouseState::default(),
            size_changed: false,
        }
    }

    /// Applies a window event. Returns `true` when the event was one the
    /// renderer cares about.
    pub fn handle_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::Resized(size) => {
                self.resize(*size);
                true
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.mouse.handle_cursor_moved(*position);
                true
            }
            WindowEvent::MouseInput { state, button, .. } if *button == MouseButton::Left => {
                self.mouse.handle_button(*state);
                true
            }
            _ => false,
        }
    }

    /// Records a new size. Only an actual change raises the size-changed flag.
    pub fn resize(&mut self, size: PhysicalSize<u32>) {
        if size != self.size {
            self.size = size;
            self.size_changed = true;
        }
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn extent(&self) -> Extent {
        Extent::new(self.size.width, self.size.height)
    }

    pub fn mouse(&self) -> &MouseState {
        &self.mouse
    }

    pub fn mouse_mut(&mut self) -> &mut MouseState {
        &mut self.mouse
    }

    pub fn mouse_position(&self) -> [f32; 2] {
        self.mouse.as_uniform(self.size.height as f32)
    }

    pub fn mouse_down(&self) -> bool {
        self.mouse.is_pressed()
    }

    pub fn size_changed(&self) -> bool {
        self.size_changed
    }

    /// Reads and clears the size-changed flag.
    pub fn take_size_changed(&mut self) -> bool {
        std::mem::replace(&mut self.size_changed, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_event_raises_flag_once() {
        let mut window = WindowState::new(PhysicalSize::new(800, 600));
        assert!(window.handle_event(&WindowEvent::Resized(PhysicalSize::new(1024, 768))));

        assert_eq!(window.extent(), Extent::new(1024, 768));
        assert!(window.take_size_changed());
        assert!(!window.take_size_changed());
    }

    #[test]
    fn same_size_does_not_count_as_change() {
        let mut window = WindowState::new(PhysicalSize::new(800, 600));
        window.resize(PhysicalSize::new(800, 600));
        assert!(!window.size_changed());
    }

    #[test]
    fn mouse_y_is_flipped_to_bottom_left_origin() {
        let mut window = WindowState::new(PhysicalSize::new(800, 600));
        assert_eq!(window.mouse_position(), [0.0, 0.0]);

        window
            .mouse_mut()
            .handle_cursor_moved(PhysicalPosition::new(100.0, 150.0));
        assert_eq!(window.mouse_position(), [100.0, 450.0]);
    }

    #[test]
    fn left_button_toggles_mouse_down() {
        let mut window = WindowState::new(PhysicalSize::new(800, 600));
        window.mouse_mut().handle_button(ElementState::Pressed);
        assert!(window.mouse_down());
        window.mouse_mut().handle_button(ElementState::Released);
        assert!(!window.mouse_down());
    }

    #[test]
    fn unrelated_events_are_ignored() {
        let mut window = WindowState::new(PhysicalSize::new(800, 600));
        assert!(!window.handle_event(&WindowEvent::Focused(true)));
        assert!(!window.size_changed());
    }
}
