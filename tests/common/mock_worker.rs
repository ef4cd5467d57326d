// Mock stage workers for integration tests
#![allow(dead_code)]

use std::io::Cursor;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

use actix_web::{App, HttpResponse, HttpServer, dev::ServerHandle, web};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64_STANDARD};
use image::{DynamicImage, ImageFormat, Rgba, imageops::FilterType};
use serde_json::{Map, Value, json};

/// How a mock worker answers stage calls
#[derive(Clone, Debug)]
pub enum MockBehavior {
    /// Do the real image work
    Process,
    /// Reply `success: false` with this message
    Reject(String),
    /// Reply with a bare HTTP error status
    HttpError(u16),
    /// Reply 200 with a body that is not JSON
    Garbage,
    /// Hold the request this long, then process it
    Stall(Duration),
}

#[derive(Clone)]
struct MockState {
    behavior: MockBehavior,
    calls: Arc<AtomicUsize>,
}

pub struct MockWorker {
    pub address: String,
    calls: Arc<AtomicUsize>,
    handle: ServerHandle,
}

impl MockWorker {
    /// Starts a worker on an ephemeral loopback port serving every stage route.
    pub async fn start(behavior: MockBehavior) -> std::io::Result<Self> {
        let calls = Arc::new(AtomicUsize::new(0));
        let state = web::Data::new(MockState {
            behavior,
            calls: calls.clone(),
        });

        let server = HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .app_data(web::JsonConfig::default().limit(16 * 1024 * 1024))
                .route("/health", web::get().to(|| async { HttpResponse::Ok().body("Ok") }))
                .route("/resize", web::post().to(resize_handler))
                .route("/apply_filter", web::post().to(filter_handler))
                .route("/add_text_watermark", web::post().to(watermark_handler))
                .route("/convert_format", web::post().to(format_handler))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))?;

        let port = server.addrs()[0].port();
        let server = server.run();
        let handle = server.handle();
        actix_web::rt::spawn(server);

        Ok(Self {
            address: format!("127.0.0.1:{}", port),
            calls,
            handle,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn stop(self) {
        self.handle.stop(false).await;
    }
}

/// 100x100 RGB gradient encoded as PNG.
pub fn synthetic_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, 128])
    });
    encode_png(&DynamicImage::ImageRgb8(img)).unwrap()
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, String> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .map_err(|e| e.to_string())?;
    Ok(out.into_inner())
}

fn decode_input(body: &Value) -> Result<DynamicImage, String> {
    let encoded = body["image_data"].as_str().ok_or("missing image_data")?;
    let bytes = BASE64_STANDARD
        .decode(encoded)
        .map_err(|e| e.to_string())?;
    image::load_from_memory(&bytes).map_err(|e| e.to_string())
}

fn reply(success: bool, message: &str, field: &str, image: &str, extra: Value) -> Value {
    let mut body = Map::new();
    body.insert("success".to_string(), json!(success));
    body.insert("message".to_string(), json!(message));
    body.insert(field.to_string(), json!(image));
    body.insert("processing_time_ms".to_string(), json!(if success { 1 } else { 0 }));
    if let Value::Object(extra) = extra {
        body.extend(extra);
    }
    Value::Object(body)
}

/// Applies the configured behavior around `work`, answering in worker wire format.
async fn respond<F>(state: &MockState, body: &Value, field: &str, work: F) -> HttpResponse
where
    F: FnOnce(DynamicImage, &Value) -> Result<(DynamicImage, Value), String>,
{
    state.calls.fetch_add(1, Ordering::SeqCst);
    match &state.behavior {
        MockBehavior::Stall(delay) => {
            actix_web::rt::time::sleep(*delay).await;
        }
        MockBehavior::Reject(message) => {
            return HttpResponse::Ok().json(reply(false, message, field, "", json!({})));
        }
        MockBehavior::HttpError(code) => {
            let status = actix_web::http::StatusCode::from_u16(*code)
                .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);
            return HttpResponse::build(status).body("mock failure");
        }
        MockBehavior::Garbage => {
            return HttpResponse::Ok().body("<html>not json</html>");
        }
        MockBehavior::Process => {}
    }

    let result = decode_input(body)
        .and_then(|img| work(img, body))
        .and_then(|(img, extra)| encode_png(&img).map(|png| (png, extra)));
    match result {
        Ok((png, extra)) => {
            HttpResponse::Ok().json(reply(true, "ok", field, &BASE64_STANDARD.encode(png), extra))
        }
        Err(e) => HttpResponse::Ok().json(reply(false, &e, field, "", json!({}))),
    }
}

async fn resize_handler(state: web::Data<MockState>, body: web::Json<Value>) -> HttpResponse {
    respond(&state, &body, "resized_image", |img, body| {
        let tw = body["target_width"].as_u64().unwrap_or(0) as u32;
        let th = body["target_height"].as_u64().unwrap_or(0) as u32;
        let (w, h) = (img.width(), img.height());
        let (nw, nh) = match (tw, th) {
            (0, 0) => (w, h),
            (tw, 0) => (tw, (h * tw / w).max(1)),
            (0, th) => ((w * th / h).max(1), th),
            (tw, th) => (tw, th),
        };
        let resized = img.resize(nw, nh, FilterType::Triangle);
        let extra = json!({ "new_width": resized.width(), "new_height": resized.height() });
        Ok((resized, extra))
    })
    .await
}

async fn filter_handler(state: web::Data<MockState>, body: web::Json<Value>) -> HttpResponse {
    respond(&state, &body, "filtered_image", |img, body| {
        let out = match body["filter_type"].as_str() {
            Some("GRAYSCALE") => img.grayscale(),
            Some("BLUR") => img.blur(1.0),
            Some("NEGATIVE") => {
                let mut img = img;
                img.invert();
                img
            }
            Some(_) => img,
            None => return Err("missing filter_type".to_string()),
        };
        Ok((out, json!({})))
    })
    .await
}

async fn watermark_handler(state: web::Data<MockState>, body: web::Json<Value>) -> HttpResponse {
    respond(&state, &body, "watermarked_image", |img, _body| {
        // A small white block in the bottom-right corner stands in for the text.
        let mut rgba = img.to_rgba8();
        let (w, h) = rgba.dimensions();
        for x in w.saturating_sub(4)..w {
            for y in h.saturating_sub(4)..h {
                rgba.put_pixel(x, y, Rgba([255, 255, 255, 204]));
            }
        }
        Ok((DynamicImage::ImageRgba8(rgba), json!({})))
    })
    .await
}

async fn format_handler(state: web::Data<MockState>, body: web::Json<Value>) -> HttpResponse {
    respond(&state, &body, "formatted_image", |img, body| {
        match body["format"].as_str() {
            Some("PNG") => Ok((img, json!({}))),
            other => Err(format!("unsupported target format: {:?}", other)),
        }
    })
    .await
}
