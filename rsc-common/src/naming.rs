//! Instance naming convention: `<class>.<slug>.<region>.<domain>`.
//!
//! The class component is the only contract between how instances are named
//! at creation and how fleets are discovered afterwards.

use rand::Rng;

use crate::InstanceClass;

pub const SLUG_LEN: usize = 8;
const SLUG_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceName {
    pub class: InstanceClass,
    pub slug: String,
    pub region_slug: String,
    pub domain: String,
}

impl InstanceName {
    pub fn render(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.class.as_str(),
            self.slug,
            self.region_slug,
            self.domain
        )
    }
}

/// Random base-36 slug.
pub fn random_slug<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..SLUG_LEN)
        .map(|_| SLUG_ALPHABET[rng.gen_range(0..SLUG_ALPHABET.len())] as char)
        .collect()
}

pub fn generate_instance_name(class: InstanceClass, region_slug: &str, domain: &str) -> String {
    InstanceName {
        class,
        slug: random_slug(&mut rand::thread_rng()),
        region_slug: region_slug.to_string(),
        domain: domain.trim_end_matches('.').to_string(),
    }
    .render()
}

/// Split a display name back into its components. Returns None for names that
/// don't follow the convention (e.g. instances created by hand).
pub fn parse_instance_name(name: &str) -> Option<InstanceName> {
    let mut parts = name.splitn(4, '.');
    let class = InstanceClass::parse(parts.next()?)?;
    let slug = parts.next()?;
    let region_slug = parts.next()?;
    let domain = parts.next()?;
    if slug.len() != SLUG_LEN || region_slug.is_empty() || domain.is_empty() {
        return None;
    }
    Some(InstanceName {
        class,
        slug: slug.to_string(),
        region_slug: region_slug.to_string(),
        domain: domain.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn slug_is_eight_base36_chars() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let slug = random_slug(&mut rng);
            assert_eq!(slug.len(), SLUG_LEN);
            assert!(slug.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
        }
    }

    #[test]
    fn generated_name_parses_back() {
        let name = generate_instance_name(InstanceClass::Run, "lon1", "runsomecode.com.");
        assert!(name.starts_with("run."));
        assert!(name.ends_with(".lon1.runsomecode.com"));

        let parsed = parse_instance_name(&name).unwrap();
        assert_eq!(parsed.class, InstanceClass::Run);
        assert_eq!(parsed.region_slug, "lon1");
        assert_eq!(parsed.domain, "runsomecode.com");
        assert_eq!(parsed.render(), name);
    }

    #[test]
    fn foreign_names_are_rejected() {
        assert_eq!(parse_instance_name("my-droplet"), None);
        assert_eq!(parse_instance_name("judge.abcdefgh.lon1.runsomecode.com"), None);
        assert_eq!(parse_instance_name("run.short.lon1.runsomecode.com"), None);
        assert_eq!(parse_instance_name("loadbalancer.abcdefgh.sfo1"), None);
    }
}
