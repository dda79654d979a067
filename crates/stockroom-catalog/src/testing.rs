//! In-crate fakes for the inventory source and the classifier.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use stockroom_classifier::{NameClassifier, RateLimited};
use stockroom_core::{Classification, Confidence, ProductType, RawItem};
use stockroom_pos::{InventoryPage, InventorySource, PosError};

pub(crate) fn item(id: &str, name: &str, price: Option<i64>, stock: i32) -> RawItem {
    RawItem {
        external_id: id.to_string(),
        display_name: name.to_string(),
        unit_price: price,
        stock_count: stock,
    }
}

pub(crate) fn classification(
    brand: &str,
    model: &str,
    size: Option<&str>,
    confidence: Confidence,
) -> Classification {
    Classification {
        cleaned_name: format!("{brand} {model}"),
        brand: brand.to_string(),
        model: model.to_string(),
        product_type: ProductType::Sneaker,
        size: size.map(str::to_string),
        colorway: None,
        condition: None,
        variant_label: None,
        confidence,
    }
}

pub(crate) struct PagedSource {
    items: Vec<RawItem>,
    fail_at: Option<u32>,
    offsets: Mutex<Vec<u32>>,
}

impl PagedSource {
    pub(crate) fn new(items: Vec<RawItem>) -> Self {
        Self {
            items,
            fail_at: None,
            offsets: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing_at(mut self, offset: u32) -> Self {
        self.fail_at = Some(offset);
        self
    }

    pub(crate) fn offsets(&self) -> Vec<u32> {
        self.offsets.lock().unwrap().clone()
    }
}

#[async_trait]
impl InventorySource for PagedSource {
    async fn fetch_page(&self, offset: u32, limit: u32) -> Result<InventoryPage, PosError> {
        self.offsets.lock().unwrap().push(offset);
        if self.fail_at == Some(offset) {
            return Err(PosError::Unavailable {
                status: 503,
                retry_after_secs: None,
            });
        }
        let items: Vec<RawItem> = self
            .items
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok(InventoryPage {
            raw_count: items.len(),
            items,
        })
    }
}

/// Answers by raw name; unknown names classify as `None`.
#[derive(Default)]
pub(crate) struct ScriptedClassifier {
    answers: HashMap<String, Result<Option<Classification>, RateLimited>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedClassifier {
    pub(crate) fn answer(mut self, raw_name: &str, value: Option<Classification>) -> Self {
        self.answers.insert(raw_name.to_string(), Ok(value));
        self
    }

    pub(crate) fn rate_limit(mut self, raw_name: &str) -> Self {
        self.answers.insert(raw_name.to_string(), Err(RateLimited));
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl NameClassifier for ScriptedClassifier {
    async fn classify(&self, raw_name: &str) -> Result<Option<Classification>, RateLimited> {
        self.calls.lock().unwrap().push(raw_name.to_string());
        self.answers.get(raw_name).cloned().unwrap_or(Ok(None))
    }
}
