use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use neurascape::config::Rgb;
use neurascape::spatial::Vec2;
use neurascape::Surface;

use core::f64::consts::TAU;

/// [`Surface`] over a 2D canvas context, in CSS pixels.
pub(super) struct CanvasSurface {
    canvas: web_sys::HtmlCanvasElement,
    ctx: web_sys::CanvasRenderingContext2d,
    width: f32,
    height: f32,
}

impl CanvasSurface {
    pub(super) fn new(canvas: web_sys::HtmlCanvasElement) -> Result<Self, String> {
        let ctx = canvas
            .get_context("2d")
            .map_err(|_| "canvas: get_context threw".to_string())?
            .ok_or("canvas: missing 2d context".to_string())?
            .dyn_into::<web_sys::CanvasRenderingContext2d>()
            .map_err(|_| "canvas: context is not 2d".to_string())?;
        let mut surface = Self {
            canvas,
            ctx,
            width: 1.0,
            height: 1.0,
        };
        surface.sync_size();
        Ok(surface)
    }

    /// Match the backing store to the element's layout size and the device
    /// pixel ratio. Returns the new size in CSS pixels.
    pub(super) fn sync_size(&mut self) -> (f32, f32) {
        let dpr = web_sys::window()
            .map(|w| w.device_pixel_ratio())
            .filter(|r| r.is_finite() && *r > 0.0)
            .unwrap_or(1.0);
        let w = self.canvas.client_width().max(1) as f64;
        let h = self.canvas.client_height().max(1) as f64;
        self.canvas.set_width((w * dpr).round() as u32);
        self.canvas.set_height((h * dpr).round() as u32);
        let _ = self.ctx.set_transform(dpr, 0.0, 0.0, dpr, 0.0, 0.0);
        self.width = w as f32;
        self.height = h as f32;
        (self.width, self.height)
    }

    /// Canvas-relative position of a viewport point.
    pub(super) fn to_local(&self, client_x: i32, client_y: i32) -> (f32, f32) {
        let rect = self.canvas.get_bounding_client_rect();
        (
            (client_x as f64 - rect.left()) as f32,
            (client_y as f64 - rect.top()) as f32,
        )
    }

    #[allow(deprecated)]
    fn stroke_with(&mut self, color: Rgb, alpha: f32, width: f32) {
        self.ctx.set_global_alpha(alpha.clamp(0.0, 1.0) as f64);
        self.ctx.set_stroke_style(&css(color));
        self.ctx.set_line_width(width as f64);
    }
}

fn css(c: Rgb) -> JsValue {
    JsValue::from_str(&format!("rgb({}, {}, {})", c.r, c.g, c.b))
}

impl Surface for CanvasSurface {
    fn size(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    #[allow(deprecated)]
    fn clear(&mut self, color: Rgb) {
        self.ctx.set_global_alpha(1.0);
        self.ctx.set_fill_style(&css(color));
        self.ctx
            .fill_rect(0.0, 0.0, self.width as f64, self.height as f64);
    }

    #[allow(deprecated)]
    fn fill_circle(&mut self, center: Vec2, radius: f32, color: Rgb, alpha: f32) {
        self.ctx.set_global_alpha(alpha.clamp(0.0, 1.0) as f64);
        self.ctx.set_fill_style(&css(color));
        self.ctx.begin_path();
        let _ = self
            .ctx
            .arc(center.x as f64, center.y as f64, radius.max(0.0) as f64, 0.0, TAU);
        self.ctx.fill();
    }

    fn stroke_circle(&mut self, center: Vec2, radius: f32, color: Rgb, alpha: f32, width: f32) {
        self.stroke_with(color, alpha, width);
        self.ctx.begin_path();
        let _ = self
            .ctx
            .arc(center.x as f64, center.y as f64, radius.max(0.0) as f64, 0.0, TAU);
        self.ctx.stroke();
    }

    fn stroke_line(&mut self, from: Vec2, to: Vec2, color: Rgb, alpha: f32, width: f32) {
        self.stroke_with(color, alpha, width);
        self.ctx.begin_path();
        self.ctx.move_to(from.x as f64, from.y as f64);
        self.ctx.line_to(to.x as f64, to.y as f64);
        self.ctx.stroke();
    }

    fn stroke_quad(&mut self, from: Vec2, ctrl: Vec2, to: Vec2, color: Rgb, alpha: f32, width: f32) {
        self.stroke_with(color, alpha, width);
        self.ctx.begin_path();
        self.ctx.move_to(from.x as f64, from.y as f64);
        self.ctx
            .quadratic_curve_to(ctrl.x as f64, ctrl.y as f64, to.x as f64, to.y as f64);
        self.ctx.stroke();
    }
}
