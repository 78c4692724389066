//! Substring patterns over origin URLs.
//!
//! Both the resolver's bootstrap table and the builder's adapter table are
//! ordered lists of `(pattern, strategy)` rows keyed on these.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlPattern {
  contains: Vec<String>,
  excludes: Vec<String>,
  except: Vec<String>,
}

impl UrlPattern {
  /// Match URLs containing `needle`.
  pub fn contains(needle: &str) -> Self {
    Self {
      contains: vec![needle.to_string()],
      ..Default::default()
    }
  }

  /// Additionally require `needle`.
  pub fn and_contains(mut self, needle: &str) -> Self {
    self.contains.push(needle.to_string());
    self
  }

  /// Reject URLs containing `needle`.
  pub fn without(mut self, needle: &str) -> Self {
    self.excludes.push(needle.to_string());
    self
  }

  /// Reject this exact URL.
  pub fn except(mut self, url: &str) -> Self {
    self.except.push(url.to_string());
    self
  }

  pub fn matches(&self, url: &str) -> bool {
    self.contains.iter().all(|n| url.contains(n.as_str()))
      && !self.excludes.iter().any(|n| url.contains(n.as_str()))
      && !self.except.iter().any(|u| u == url)
  }
}
