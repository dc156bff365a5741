use async_trait::async_trait;
use serde_json::{Map, Value};
use wasm_bindgen::prelude::*;

use crate::store::{StateStore, StoreError};

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(catch, js_namespace = ["browser", "storage", "local"], js_name = get)]
    async fn storage_get(key: &str) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["browser", "storage", "local"], js_name = set)]
    async fn storage_set(items: JsValue) -> Result<JsValue, JsValue>;
}

/// `browser.storage.local`, the store shared with the options page
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtensionStore;

fn backend_error(err: JsValue) -> StoreError {
    StoreError::Backend(format!("{err:?}"))
}

fn to_js(value: &Value) -> Result<JsValue, StoreError> {
    let text = serde_json::to_string(value)?;
    js_sys::JSON::parse(&text).map_err(backend_error)
}

pub(super) fn from_js(value: &JsValue) -> Result<Value, StoreError> {
    let text: String = js_sys::JSON::stringify(value)
        .map_err(backend_error)?
        .into();
    Ok(serde_json::from_str(&text)?)
}

#[async_trait(?Send)]
impl StateStore for ExtensionStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let items = storage_get(key).await.map_err(backend_error)?;
        let value = js_sys::Reflect::get(&items, &JsValue::from_str(key)).map_err(backend_error)?;
        if value.is_undefined() || value.is_null() {
            return Ok(None);
        }
        from_js(&value).map(Some)
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut items = Map::new();
        items.insert(key.to_string(), value);
        storage_set(to_js(&Value::Object(items))?)
            .await
            .map(|_| ())
            .map_err(backend_error)
    }
}
