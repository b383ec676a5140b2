//! Terminal viewer for the depth demo
//!
//! Renders each frame with Unicode half-block characters, shows the status
//! report underneath, and feeds terminal key and mouse events back into the
//! demo.

use anyhow::Result;
use crossterm::{
    cursor::Show,
    event::{
        DisableMouseCapture, EnableMouseCapture, Event, EventStream, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use depth_vision::{DepthApp, DrawOutput, Key};
use futures::StreamExt;
use image::RgbImage;
use ratatui::{
    Terminal, backend::CrosstermBackend, buffer::Buffer, layout::Rect, style::Color, style::Style,
    widgets::Widget,
};
use std::io::{self, stdout};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// The demo runs its update/draw pair at 60 Hz.
const FRAME_INTERVAL: Duration = Duration::from_micros(16_667);

/// Run the terminal viewer until the user quits.
pub async fn run(app: &mut DepthApp) -> Result<()> {
    // Set up terminal. Once raw mode is on, every exit path restores it.
    enable_raw_mode()?;
    let _restore = RestoreGuard::new(restore_terminal);
    execute!(stdout(), EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout());
    let mut terminal = Terminal::new(backend)?;

    run_app(&mut terminal, app).await
}

/// Runs its cleanup once when dropped.
struct RestoreGuard<F: FnOnce()> {
    cleanup: Option<F>,
}

impl<F: FnOnce()> RestoreGuard<F> {
    fn new(cleanup: F) -> Self {
        Self { cleanup: Some(cleanup) }
    }
}

impl<F: FnOnce()> Drop for RestoreGuard<F> {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

fn restore_terminal() {
    if let Err(e) = disable_raw_mode() {
        warn!(error = %e, "Failed to leave raw mode");
    }
    if let Err(e) = execute!(stdout(), DisableMouseCapture, LeaveAlternateScreen, Show) {
        warn!(error = %e, "Failed to restore the terminal screen");
    }
}

async fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut DepthApp) -> Result<()> {
    let mut events = EventStream::new();
    let mut ticker = tokio::time::interval(FRAME_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut layout = FrameLayout::default();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                app.update();
                let output = app.draw();
                terminal.draw(|f| layout = render(f, &output))?;
            }
            event = events.next() => match event {
                Some(Ok(event)) => {
                    if handle_event(app, &layout, event) == Flow::Quit {
                        info!("Quit requested");
                        break;
                    }
                }
                Some(Err(e)) => return Err(e.into()),
                None => break,
            },
        }
    }

    Ok(())
}

fn render(f: &mut ratatui::Frame, output: &DrawOutput) -> FrameLayout {
    let area = f.area();

    // Reserve the bottom lines for the status report
    let status_height = (output.status.len() as u16).min(area.height / 3);
    let frame_area = Rect {
        x: area.x,
        y: area.y,
        width: area.width,
        height: area.height.saturating_sub(status_height),
    };
    let status_area = Rect {
        x: area.x,
        y: area.y + frame_area.height,
        width: area.width,
        height: status_height,
    };

    let layout = FrameLayout::fit(frame_area, output.frame.width(), output.frame.height());
    f.render_widget(
        FrameWidget {
            frame: &output.frame,
            layout,
        },
        frame_area,
    );
    f.render_widget(StatusPanel { lines: &output.status }, status_area);
    layout
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

#[derive(Debug, PartialEq, Eq)]
enum Action {
    Key(Key),
    Quit,
    Ignore,
}

fn map_key(key: KeyEvent) -> Action {
    if key.kind != KeyEventKind::Press {
        return Action::Ignore;
    }
    match key.code {
        // Ctrl+C to quit; a plain 'c' closes the device
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Action::Quit,
        KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
        KeyCode::Char(c) => Action::Key(Key::Char(c)),
        KeyCode::Up => Action::Key(Key::Up),
        KeyCode::Down => Action::Key(Key::Down),
        _ => Action::Ignore,
    }
}

fn handle_event(app: &mut DepthApp, layout: &FrameLayout, event: Event) -> Flow {
    match event {
        Event::Key(key) => match map_key(key) {
            Action::Key(key) => app.key_pressed(key),
            Action::Quit => return Flow::Quit,
            Action::Ignore => {}
        },
        Event::Mouse(mouse) => handle_mouse(app, layout, mouse),
        _ => {}
    }
    Flow::Continue
}

fn handle_mouse(app: &mut DepthApp, layout: &FrameLayout, mouse: MouseEvent) {
    if let MouseEventKind::Up(MouseButton::Left) = mouse.kind {
        app.mouse_released();
        return;
    }
    let Some((x, y)) = layout.frame_pixel(mouse.column, mouse.row) else {
        return;
    };
    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => app.mouse_pressed(x, y),
        MouseEventKind::Drag(MouseButton::Left) => app.mouse_dragged(x, y),
        _ => {}
    }
}

/// Where a frame lands in the terminal, and how cells map back to its pixels.
/// Each cell shows two vertically stacked pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct FrameLayout {
    x_offset: u16,
    y_offset: u16,
    display_width: u16,
    display_height: u16,
    x_scale: f64,
    y_scale: f64,
}

impl FrameLayout {
    /// Fits a `frame_width` x `frame_height` frame into `area`, keeping its aspect ratio.
    fn fit(area: Rect, frame_width: u32, frame_height: u32) -> Self {
        if frame_width == 0 || frame_height == 0 || area.width == 0 || area.height == 0 {
            return Self::default();
        }
        let frame_aspect = frame_width as f64 / frame_height as f64;
        let term_width = area.width as f64;
        let term_height = (area.height as f64) * 2.0;

        let (display_width, display_height) = if term_width / term_height > frame_aspect {
            // Terminal is wider - fit to height
            let w = term_height * frame_aspect;
            (w as u16, area.height)
        } else {
            // Terminal is taller - fit to width
            let h = term_width / frame_aspect;
            (area.width, (h / 2.0) as u16)
        };
        if display_width == 0 || display_height == 0 {
            return Self::default();
        }

        Self {
            x_offset: area.x + (area.width - display_width) / 2,
            y_offset: area.y + (area.height - display_height) / 2,
            display_width,
            display_height,
            x_scale: frame_width as f64 / display_width as f64,
            y_scale: frame_height as f64 / (display_height as f64 * 2.0),
        }
    }

    /// The frame pixel under the top half of terminal cell `(column, row)`.
    fn frame_pixel(&self, column: u16, row: u16) -> Option<(f32, f32)> {
        let inside_x = column >= self.x_offset && column < self.x_offset + self.display_width;
        let inside_y = row >= self.y_offset && row < self.y_offset + self.display_height;
        if !inside_x || !inside_y {
            return None;
        }
        let tx = (column - self.x_offset) as f64;
        let ty = (row - self.y_offset) as f64;
        Some(((tx * self.x_scale) as f32, (ty * 2.0 * self.y_scale) as f32))
    }
}

/// Widget that renders a frame using half-block characters
struct FrameWidget<'a> {
    frame: &'a RgbImage,
    layout: FrameLayout,
}

impl Widget for FrameWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let layout = self.layout;
        let (width, height) = self.frame.dimensions();
        if layout.display_width == 0 {
            return;
        }

        for ty in 0..layout.display_height {
            for tx in 0..layout.display_width {
                let term_x = layout.x_offset + tx;
                let term_y = layout.y_offset + ty;
                if term_x >= area.x + area.width || term_y >= area.y + area.height {
                    continue;
                }

                let src_x = ((tx as f64 * layout.x_scale) as u32).min(width - 1);
                let src_y_top = ((ty as f64 * 2.0 * layout.y_scale) as u32).min(height - 1);
                let src_y_bottom = (((ty as f64 * 2.0 + 1.0) * layout.y_scale) as u32).min(height - 1);

                let top = self.frame.get_pixel(src_x, src_y_top).0;
                let bottom = self.frame.get_pixel(src_x, src_y_bottom).0;

                if let Some(cell) = buf.cell_mut((term_x, term_y)) {
                    cell.set_char('▀');
                    cell.set_fg(Color::Rgb(top[0], top[1], top[2]));
                    cell.set_bg(Color::Rgb(bottom[0], bottom[1], bottom[2]));
                }
            }
        }
    }
}

struct StatusPanel<'a> {
    lines: &'a [String],
}

impl Widget for StatusPanel<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let style = Style::default().fg(Color::White).bg(Color::DarkGray);
        for (row, line) in (area.y..area.y + area.height).zip(self.lines) {
            for x in area.x..area.x + area.width {
                if let Some(cell) = buf.cell_mut((x, row)) {
                    cell.set_char(' ');
                    cell.set_bg(Color::DarkGray);
                }
            }
            let text: String = line.chars().take(area.width as usize).collect();
            buf.set_string(area.x, row, text, style);
        }
    }
}
