use groupiron_shared::MapDescriptor;
use js_sys::Reflect;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::HtmlImageElement;

use crate::config::DESCRIPTOR_URL;
use crate::tiles::{AssetEvent, AssetInbox, AssetKey, AssetLoader, LoadedImage};

const ONLOAD_HANDLE_KEY: &str = "__groupironOnload";
const ONERROR_HANDLE_KEY: &str = "__groupironOnerror";

/// Loads map images through `<img>` elements and reports into the inbox.
#[derive(Clone)]
pub struct ImageLoader {
    inbox: AssetInbox<HtmlImageElement>,
}

impl ImageLoader {
    pub fn new(inbox: AssetInbox<HtmlImageElement>) -> Self {
        Self { inbox }
    }
}

impl AssetLoader for ImageLoader {
    type Image = HtmlImageElement;

    fn load(&self, key: AssetKey) {
        let url = key.url();
        let img = match HtmlImageElement::new() {
            Ok(img) => img,
            Err(err) => {
                self.inbox
                    .push(AssetEvent::Failed(key, format!("image element: {err:?}")));
                return;
            }
        };

        let img_for_load = img.clone();
        let inbox_load = self.inbox.clone();
        let onload = Closure::<dyn FnMut()>::new(move || {
            clear_image_handlers(&img_for_load);
            let img = img_for_load.clone();
            let inbox = inbox_load.clone();
            wasm_bindgen_futures::spawn_local(async move {
                // Decode off the frame so the first draw doesn't stall.
                let _ = JsFuture::from(img.decode()).await;
                let width = img.natural_width() as f64;
                let height = img.natural_height() as f64;
                inbox.push(AssetEvent::Loaded(
                    key,
                    LoadedImage {
                        image: img,
                        width,
                        height,
                    },
                ));
            });
        });

        let img_for_error = img.clone();
        let inbox_error = self.inbox.clone();
        let url_for_error = url.clone();
        let onerror = Closure::<dyn FnMut()>::new(move || {
            clear_image_handlers(&img_for_error);
            inbox_error.push(AssetEvent::Failed(key, format!("failed to load {url_for_error}")));
        });

        let onload_js = onload.into_js_value();
        let onerror_js = onerror.into_js_value();
        img.set_onload(Some(onload_js.unchecked_ref()));
        img.set_onerror(Some(onerror_js.unchecked_ref()));
        let _ = Reflect::set(
            img.as_ref(),
            &JsValue::from_str(ONLOAD_HANDLE_KEY),
            &onload_js,
        );
        let _ = Reflect::set(
            img.as_ref(),
            &JsValue::from_str(ONERROR_HANDLE_KEY),
            &onerror_js,
        );
        img.set_src(&url);
    }
}

fn clear_image_handlers(img: &HtmlImageElement) {
    img.set_onload(None);
    img.set_onerror(None);
    let _ = Reflect::delete_property(img.as_ref(), &JsValue::from_str(ONLOAD_HANDLE_KEY));
    let _ = Reflect::delete_property(img.as_ref(), &JsValue::from_str(ONERROR_HANDLE_KEY));
}

/// Fetch the map descriptor once and hand the result to the inbox.
pub fn request_descriptor(inbox: AssetInbox<HtmlImageElement>) {
    wasm_bindgen_futures::spawn_local(async move {
        match fetch_descriptor().await {
            Ok(descriptor) => inbox.push(AssetEvent::Descriptor(Box::new(descriptor))),
            Err(err) => inbox.push(AssetEvent::DescriptorFailed(err)),
        }
    });
}

async fn fetch_descriptor() -> Result<MapDescriptor, String> {
    let resp = gloo_net::http::Request::get(DESCRIPTOR_URL)
        .send()
        .await
        .map_err(|e| format!("fetch error: {e}"))?;

    if !resp.ok() {
        return Err(format!("HTTP {}", resp.status()));
    }

    resp.json::<MapDescriptor>()
        .await
        .map_err(|e| format!("parse error: {e}"))
}
