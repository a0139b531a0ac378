//! Terminal replay of a recorded CartPole episode.

use std::time::{Duration, Instant};

use cemplan_env::{CartPoleConfig, PUSH_LEFT};
use cemplan_evaluator::rollout_evaluator::EpisodeRecording;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    DefaultTerminal, Frame,
    layout::{Constraint, Layout},
    style::{Color, Stylize as _},
    symbols::Marker,
    text::Line,
    widgets::{
        Block, Paragraph,
        canvas::{self, Canvas, Rectangle},
    },
};

const MIN_SPEED: f64 = 0.125;
const MAX_SPEED: f64 = 16.0;

const CART_WIDTH: f64 = 0.5;
const CART_HEIGHT: f64 = 0.3;

#[derive(Debug)]
pub(crate) struct Viewer {
    recording: EpisodeRecording,
    cartpole: CartPoleConfig,
    step_interval: Duration,
    /// Index of the displayed observation; `0` is the initial state.
    position: usize,
    speed: f64,
    paused: bool,
    exiting: bool,
}

impl Viewer {
    pub(crate) fn new(recording: EpisodeRecording, cartpole: CartPoleConfig, fps: u32) -> Self {
        Self {
            recording,
            cartpole,
            step_interval: Duration::from_secs_f64(1.0 / f64::from(fps.max(1))),
            position: 0,
            speed: 1.0,
            paused: false,
            exiting: false,
        }
    }

    pub(crate) fn run(&mut self, terminal: &mut DefaultTerminal) -> anyhow::Result<()> {
        let mut last_tick = Instant::now();
        while !self.exiting {
            terminal.draw(|f| self.draw(f))?;

            let timeout = self.tick_interval().saturating_sub(last_tick.elapsed());
            if event::poll(timeout)?
                && let Event::Key(key) = event::read()?
                && key.kind == KeyEventKind::Press
            {
                self.handle_key(key);
            }

            if last_tick.elapsed() >= self.tick_interval() {
                self.tick();
                last_tick = Instant::now();
            }
        }
        Ok(())
    }

    fn tick_interval(&self) -> Duration {
        self.step_interval.div_f64(self.speed)
    }

    fn last_position(&self) -> usize {
        self.recording.steps.len()
    }

    fn is_finished(&self) -> bool {
        self.position >= self.last_position()
    }

    fn tick(&mut self) {
        if !self.paused && !self.is_finished() {
            self.position += 1;
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.exiting = true,
            KeyCode::Char('p' | ' ') => self.paused = !self.paused,
            KeyCode::Char('+' | '=') => self.speed = (self.speed * 2.0).min(MAX_SPEED),
            KeyCode::Char('-') => self.speed = (self.speed / 2.0).max(MIN_SPEED),
            KeyCode::Char('r') => self.position = 0,
            KeyCode::Right if self.paused => {
                self.position = (self.position + 1).min(self.last_position());
            }
            KeyCode::Left if self.paused => self.position = self.position.saturating_sub(1),
            _ => {}
        }
    }

    fn draw(&self, frame: &mut Frame) {
        let [world_area, status_area] =
            Layout::vertical([Constraint::Min(5), Constraint::Length(4)]).areas(frame.area());

        let observation = self
            .recording
            .observation(self.position)
            .unwrap_or(&self.recording.initial_observation);
        let x = f64::from(observation[0]);
        let theta = f64::from(observation[2]);

        let x_threshold = self.cartpole.x_threshold;
        let x_bound = x_threshold + CART_WIDTH;
        let pole_length = 2.0 * self.cartpole.pole_half_length;

        let world = Canvas::default()
            .block(Block::bordered().title(" CartPole "))
            .marker(Marker::Braille)
            .x_bounds([-x_bound, x_bound])
            .y_bounds([-0.2, CART_HEIGHT + pole_length + 0.2])
            .paint(|ctx| {
                ctx.draw(&canvas::Line::new(-x_bound, 0.0, x_bound, 0.0, Color::DarkGray));
                for edge in [-x_threshold, x_threshold] {
                    ctx.draw(&canvas::Line::new(edge, 0.0, edge, CART_HEIGHT, Color::Red));
                }
                ctx.draw(&Rectangle {
                    x: x - CART_WIDTH / 2.0,
                    y: 0.0,
                    width: CART_WIDTH,
                    height: CART_HEIGHT,
                    color: Color::Cyan,
                });
                ctx.draw(&canvas::Line::new(
                    x,
                    CART_HEIGHT,
                    x + pole_length * theta.sin(),
                    CART_HEIGHT + pole_length * theta.cos(),
                    Color::Yellow,
                ));
            });
        frame.render_widget(world, world_area);
        frame.render_widget(self.status(), status_area);
    }

    fn status(&self) -> Paragraph<'_> {
        let reward = self.recording.steps[..self.position]
            .iter()
            .map(|s| s.transition.reward)
            .sum::<f32>();
        let action = match self.position.checked_sub(1).map(|i| &self.recording.steps[i]) {
            Some(step) if step.action == PUSH_LEFT => "←",
            Some(_) => "→",
            None => "·",
        };
        let state = match (self.is_finished(), self.paused) {
            (false, true) => "paused",
            (false, false) => "playing",
            (true, _) if self.recording.stats.truncated => "finished: reached the step limit",
            (true, _) => "finished: pole fell or cart left the track",
        };
        let lines = vec![
            Line::from(format!(
                "step {}/{}  reward {reward:.0}  action {action}  speed {}x  {state}",
                self.position,
                self.last_position(),
                self.speed,
            )),
            Line::from("q quit  p/space pause  +/- speed  r restart  ←/→ step while paused")
                .dark_gray(),
        ];
        Paragraph::new(lines).block(Block::bordered())
    }
}

#[cfg(test)]
mod tests {
    use cemplan_env::CartPole;
    use cemplan_evaluator::{
        policy::{LinearPolicy, ParamShape},
        rollout_evaluator::play_episode_recorded,
    };
    use crossterm::event::KeyModifiers;
    use ratatui::{Terminal, backend::TestBackend};

    use super::*;

    /// Always pushes right, so the episode ends after a few dozen steps.
    fn viewer() -> Viewer {
        let mut weights = vec![0.0; 8];
        weights.extend([0.0, 1.0]);
        let policy = LinearPolicy::new(ParamShape::new(5, 2), weights).unwrap();
        let mut env = CartPole::with_seed(0);
        let recording = play_episode_recorded(&mut env, &policy, Some(0)).unwrap();
        Viewer::new(recording, CartPoleConfig::default(), 50)
    }

    fn press(viewer: &mut Viewer, code: KeyCode) {
        viewer.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    #[test]
    fn test_ticks_advance_until_the_end() {
        let mut viewer = viewer();
        let last = viewer.last_position();
        assert!(last > 0);
        viewer.tick();
        assert_eq!(viewer.position, 1);
        for _ in 0..last + 10 {
            viewer.tick();
        }
        assert_eq!(viewer.position, last);
        assert!(viewer.is_finished());
    }

    #[test]
    fn test_pause_and_step() {
        let mut viewer = viewer();
        press(&mut viewer, KeyCode::Char('p'));
        viewer.tick();
        assert_eq!(viewer.position, 0);

        press(&mut viewer, KeyCode::Right);
        press(&mut viewer, KeyCode::Right);
        press(&mut viewer, KeyCode::Left);
        assert_eq!(viewer.position, 1);

        press(&mut viewer, KeyCode::Char(' '));
        assert!(!viewer.paused);
        press(&mut viewer, KeyCode::Right);
        assert_eq!(viewer.position, 1);
    }

    #[test]
    fn test_speed_is_clamped() {
        let mut viewer = viewer();
        let base = viewer.tick_interval();
        press(&mut viewer, KeyCode::Char('+'));
        assert_eq!(viewer.speed, 2.0);
        assert!(viewer.tick_interval() < base);
        for _ in 0..10 {
            press(&mut viewer, KeyCode::Char('+'));
        }
        assert_eq!(viewer.speed, MAX_SPEED);
        for _ in 0..20 {
            press(&mut viewer, KeyCode::Char('-'));
        }
        assert_eq!(viewer.speed, MIN_SPEED);
    }

    #[test]
    fn test_restart_and_quit() {
        let mut viewer = viewer();
        viewer.tick();
        viewer.tick();
        press(&mut viewer, KeyCode::Char('r'));
        assert_eq!(viewer.position, 0);
        assert!(!viewer.exiting);
        press(&mut viewer, KeyCode::Char('q'));
        assert!(viewer.exiting);
    }

    #[test]
    fn test_draws_status_line() {
        let mut viewer = viewer();
        let mut terminal = Terminal::new(TestBackend::new(80, 20)).unwrap();
        terminal.draw(|f| viewer.draw(f)).unwrap();
        let text = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(ratatui::buffer::Cell::symbol)
            .collect::<String>();
        assert!(text.contains("step 0/"), "{text}");

        for _ in 0..=viewer.last_position() {
            viewer.tick();
        }
        terminal.draw(|f| viewer.draw(f)).unwrap();
        let text = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(ratatui::buffer::Cell::symbol)
            .collect::<String>();
        assert!(text.contains("finished"), "{text}");
    }
}
