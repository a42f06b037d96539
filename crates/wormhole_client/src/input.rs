use std::collections::HashSet;

use glam::Vec2;
use winit::keyboard::KeyCode;

#[derive(Debug, Default)]
pub struct InputState {
    pressed_keys: HashSet<KeyCode>,
    pub mouse_delta: Vec2,
    pub left_click: bool,
    pub right_click: bool,
}

impl InputState {
    pub fn press_key(&mut self, key: KeyCode) {
        self.pressed_keys.insert(key);
    }

    pub fn release_key(&mut self, key: KeyCode) {
        self.pressed_keys.remove(&key);
    }

    pub fn is_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    pub fn add_mouse_delta(&mut self, delta: Vec2) {
        self.mouse_delta += delta;
    }

    pub fn clear_frame(&mut self) {
        self.mouse_delta = Vec2::ZERO;
    }

    pub fn release_all(&mut self) {
        self.pressed_keys.clear();
        self.mouse_delta = Vec2::ZERO;
        self.left_click = false;
        self.right_click = false;
    }

    pub fn consume_left_click(&mut self) -> bool {
        let value = self.left_click;
        self.left_click = false;
        value
    }

    pub fn consume_right_click(&mut self) -> bool {
        let value = self.right_click;
        self.right_click = false;
        value
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec2;
    use winit::keyboard::KeyCode;

    use super::InputState;

    #[test]
    fn clicks_are_consumed_once() {
        let mut input = InputState {
            left_click: true,
            ..InputState::default()
        };
        assert!(input.consume_left_click());
        assert!(!input.consume_left_click());
        assert!(!input.consume_right_click());
    }

    #[test]
    fn release_all_drops_held_state() {
        let mut input = InputState::default();
        input.press_key(KeyCode::KeyW);
        input.add_mouse_delta(Vec2::new(3.0, 4.0));
        input.right_click = true;
        input.release_all();

        assert!(!input.is_pressed(KeyCode::KeyW));
        assert_eq!(input.mouse_delta, Vec2::ZERO);
        assert!(!input.consume_right_click());
    }
}
