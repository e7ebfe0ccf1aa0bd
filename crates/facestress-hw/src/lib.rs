//! facestress-hw — V4L2 camera capture for the facestress media-device interface.
//!
//! Negotiates a capture format close to the requested resolution, converts
//! YUYV/MJPG/GREY/Y16 buffers to RGB, and exposes the device as a
//! [`facestress_core::MediaDevices`] implementation.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat, V4lMediaDevices, V4lStream};
