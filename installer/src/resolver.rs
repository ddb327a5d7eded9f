//! Release asset resolution.
//!
//! Selects one asset from a release for a product and platform. A strict
//! pass requires the product, an OS token and an architecture token in the
//! asset name; when nothing matches strictly, a relaxed pass accepts any
//! asset naming the product. Multiple matches are settled by a single
//! [`TieBreak`] policy.

use std::fmt;
use std::str::FromStr;

use crate::error::{InstallerError, Result};
use crate::platform::PlatformTag;
use crate::release::{ReleaseAsset, ReleaseInfo};

/// Policy for choosing among several matching assets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TieBreak {
    /// First match in registry order.
    FirstMatch,
    /// Match with the largest reported size, so a checksum or manifest
    /// sidecar sharing the binary's name is never chosen over the binary.
    #[default]
    LargestSize,
}

impl FromStr for TieBreak {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "first" | "first-match" => Ok(Self::FirstMatch),
            "largest" | "largest-size" => Ok(Self::LargestSize),
            other => Err(format!(
                "unknown tie-break policy \"{other}\" (expected \"first\" or \"largest\")"
            )),
        }
    }
}

impl fmt::Display for TieBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FirstMatch => "first",
            Self::LargestSize => "largest",
        })
    }
}

/// What to look for in a release.
#[derive(Debug, Clone)]
pub struct AssetQuery<'a> {
    /// Product identifier token, matched case-insensitively.
    pub product: &'a str,
    /// Platform whose token vocabulary must appear in strict matches.
    pub platform: PlatformTag,
    /// Tie-break policy.
    pub tie_break: TieBreak,
    /// Exact asset name that bypasses matching entirely.
    pub explicit: Option<&'a str>,
}

impl<'a> AssetQuery<'a> {
    /// Query for `product` on `platform` with the default tie-break.
    #[must_use]
    pub fn new(product: &'a str, platform: PlatformTag) -> Self {
        Self {
            product,
            platform,
            tie_break: TieBreak::default(),
            explicit: None,
        }
    }

    /// Replace the tie-break policy.
    #[must_use]
    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// Select an asset by exact name instead of matching.
    #[must_use]
    pub fn with_explicit(mut self, name: Option<&'a str>) -> Self {
        self.explicit = name;
        self
    }

    fn names_product(&self, lower_name: &str) -> bool {
        lower_name.contains(&self.product.to_lowercase())
    }

    fn names_platform(&self, lower_name: &str) -> bool {
        let os = self.platform.os.asset_tokens();
        let arch = self.platform.arch.asset_tokens();
        os.iter().any(|token| lower_name.contains(token))
            && arch.iter().any(|token| lower_name.contains(token))
    }
}

/// Resolve the single asset to download.
///
/// # Errors
///
/// Returns [`InstallerError::AssetNotFound`] when neither pass matches, or
/// when an explicit asset name is absent from the release.
///
/// # Examples
///
/// ```
/// use cfai_installer::platform::PlatformTag;
/// use cfai_installer::release::{ReleaseAsset, ReleaseInfo};
/// use cfai_installer::resolver::{AssetQuery, resolve_asset};
///
/// let asset = |name: &str| ReleaseAsset {
///     name: name.to_owned(),
///     url: format!("https://example.test/{name}"),
///     size_bytes: 10,
/// };
/// let release = ReleaseInfo {
///     version_tag: "v1.0.0".to_owned(),
///     assets: vec![asset("cfai-darwin-arm64.tar.gz"), asset("cfai-linux-amd64.tar.gz")],
/// };
/// let platform = PlatformTag::from_raw("linux", "x86_64").expect("known");
/// let chosen = resolve_asset(&release, &AssetQuery::new("cfai", platform)).expect("match");
/// assert_eq!(chosen.name, "cfai-linux-amd64.tar.gz");
/// ```
pub fn resolve_asset<'r>(
    release: &'r ReleaseInfo,
    query: &AssetQuery<'_>,
) -> Result<&'r ReleaseAsset> {
    let not_found = || InstallerError::AssetNotFound {
        product: query.explicit.unwrap_or(query.product).to_owned(),
        platform: query.platform.to_string(),
        tag: release.version_tag.clone(),
    };

    if let Some(name) = query.explicit {
        log::debug!(target: "resolver", "selecting asset {name} by name");
        return release
            .assets
            .iter()
            .find(|asset| asset.name == name)
            .ok_or_else(not_found);
    }

    let strict: Vec<&ReleaseAsset> = release
        .assets
        .iter()
        .filter(|asset| {
            let lower = asset.name.to_lowercase();
            query.names_product(&lower) && query.names_platform(&lower)
        })
        .collect();

    let candidates = if strict.is_empty() {
        log::debug!(
            target: "resolver",
            "no asset names {}; relaxing to product-only match",
            query.platform
        );
        release
            .assets
            .iter()
            .filter(|asset| query.names_product(&asset.name.to_lowercase()))
            .collect()
    } else {
        strict
    };

    let chosen = pick(candidates, query.tie_break).ok_or_else(not_found)?;
    log::debug!(
        target: "resolver",
        "resolved {} ({} bytes) with {} tie-break",
        chosen.name,
        chosen.size_bytes,
        query.tie_break
    );
    Ok(chosen)
}

fn pick(candidates: Vec<&ReleaseAsset>, tie_break: TieBreak) -> Option<&ReleaseAsset> {
    match tie_break {
        TieBreak::FirstMatch => candidates.into_iter().next(),
        // `max_by_key` keeps the last of equal maxima; fold so registry
        // order wins among equal sizes.
        TieBreak::LargestSize => candidates.into_iter().fold(None, |best, asset| match best {
            Some(current) if current.size_bytes >= asset.size_bytes => Some(current),
            _ => Some(asset),
        }),
    }
}
