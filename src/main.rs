// main.rs — windowed photo sphere viewer

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod viewer;

use anyhow::Context;
use clap::Parser;
use photosphere::config::{ViewerArgs, ViewerConfig};
use photosphere::logging::{self, LoggingConfig};
use photosphere::PhotoSphere;
use std::sync::Arc;
use viewer::Viewer;
use winit::{
    dpi::LogicalSize,
    event::*,
    event_loop::{ControlFlow, EventLoop},
    window::WindowBuilder,
};

fn main() -> anyhow::Result<()> {
    let args = ViewerArgs::parse();
    let config = ViewerConfig::from_args(&args)?;
    logging::init_logging(LoggingConfig {
        filter: config.log_filter().map(str::to_string),
        ..LoggingConfig::default()
    });

    let mut item = PhotoSphere::default();
    // a bad initial source is not fatal; the viewer starts empty
    let startup = config.apply(&mut item);

    let event_loop = EventLoop::new();
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Photo Sphere")
            .with_inner_size(LogicalSize::new(1280, 720))
            .build(&event_loop)
            .context("creating window")?,
    );
    let mut viewer = pollster::block_on(Viewer::new(&window, item)).context("initialising GPU")?;
    viewer.show_load_result(startup);

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Poll;

        match event {
            Event::WindowEvent { event, .. } => {
                if viewer.on_event(&event) {
                    return;
                }

                match event {
                    WindowEvent::CloseRequested => {
                        *control_flow = ControlFlow::Exit;
                    }

                    WindowEvent::Resized(new_size) => {
                        viewer.resize(new_size);
                    }

                    WindowEvent::KeyboardInput { input, .. } => {
                        if input.state == ElementState::Pressed {
                            match input.virtual_keycode {
                                Some(VirtualKeyCode::O) => viewer.open_dialog(),
                                Some(VirtualKeyCode::F11) => Viewer::toggle_fullscreen(&window),
                                _ => {}
                            }
                        }
                    }

                    WindowEvent::DroppedFile(path) => {
                        viewer.open(path);
                    }

                    _ => {}
                }
            }

            Event::RedrawRequested(_) => {
                match viewer.render(&window) {
                    Ok(_) => {}
                    Err(wgpu::SurfaceError::Lost) => viewer.resize(viewer.size()),
                    Err(wgpu::SurfaceError::OutOfMemory) => *control_flow = ControlFlow::Exit,
                    Err(e) => log::warn!("surface error: {e:?}"),
                }
                if viewer.quit_requested() {
                    *control_flow = ControlFlow::Exit;
                }
            }

            Event::MainEventsCleared => {
                window.request_redraw();
            }

            _ => {}
        }
    });
}
