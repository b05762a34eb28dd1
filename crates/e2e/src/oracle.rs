//! Item existence checks against the rendered tree

use tracing::debug;

use crate::driver::UiDriver;
use crate::error::E2eResult;
use crate::selectors::Selectors;

/// Answers "is an item labelled exactly X in the tree right now?"
pub struct ExistenceOracle<'a, D: UiDriver + ?Sized> {
    driver: &'a D,
    selectors: &'a Selectors,
}

impl<'a, D: UiDriver + ?Sized> ExistenceOracle<'a, D> {
    pub fn new(driver: &'a D, selectors: &'a Selectors) -> Self {
        Self { driver, selectors }
    }

    pub async fn exists(&self, label: &str) -> E2eResult<bool> {
        Ok(self.count(label).await? > 0)
    }

    /// Number of tree items whose label text equals `label` exactly.
    pub async fn count(&self, label: &str) -> E2eResult<usize> {
        let labels = self.driver.all_texts(&self.selectors.tree_item_label).await?;
        let count = labels.iter().filter(|text| text.trim() == label).count();
        debug!("oracle: '{}' present {} time(s) among {} items", label, count, labels.len());
        Ok(count)
    }

    /// Every label currently in the tree.
    pub async fn labels(&self) -> E2eResult<Vec<String>> {
        let labels = self.driver.all_texts(&self.selectors.tree_item_label).await?;
        Ok(labels.into_iter().map(|l| l.trim().to_string()).collect())
    }
}
