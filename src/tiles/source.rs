use std::sync::atomic::Ordering;

use crate::core::geo::TileCoord;
use crate::tiles::provider::TileProvider;

/// Trait representing anything that can produce tile URLs for a given coordinate.
pub trait TileSource: Send + Sync {
    /// Build a fetch URL for the requested `coord`.
    fn url(&self, coord: TileCoord) -> String;
}

impl TileSource for TileProvider {
    fn url(&self, coord: TileCoord) -> String {
        let mut url = self.url_template.clone();

        if !self.servers.is_empty() {
            // Atomic rotation keeps the round-robin fair under concurrent
            // workers; the counter wraps on overflow, which is harmless.
            let n = self.next_server.fetch_add(1, Ordering::Relaxed);
            url = url.replace("{$s}", &self.servers[n % self.servers.len()]);
        }

        let y = if self.inverse_y {
            (1u32 << coord.z) - 1 - coord.y
        } else {
            coord.y
        };

        url = url.replace("{$l}", &self.locale);
        url = url.replace("{$z}", &coord.z.to_string());
        url = url.replace("{$x}", &coord.x.to_string());
        url = url.replace("{$y}", &y.to_string());

        if url.contains("{$q}") {
            url = url.replace("{$q}", &encode_quad_tree(coord));
        }
        if url.contains("{$g}") {
            if let Some(secret) = &self.secret {
                let len = ((3 * coord.x as u64 + coord.y as u64) & 7) as usize;
                // Prefix by characters, not bytes; secrets are not
                // guaranteed to be ASCII.
                let prefix = match secret.char_indices().nth(len) {
                    Some((i, _)) => &secret[..i],
                    None => secret.as_str(),
                };
                url = url.replace("{$g}", prefix);
            }
        }

        url
    }
}

/// Quadtree tile number as used by Bing-style servers: one base-4 digit per
/// zoom level, most significant first, digit = `(x & 1) | ((y & 1) << 1)`
/// peeling the low bits off x and y each step.
///
/// See <http://msdn.microsoft.com/en-us/library/bb259689.aspx>.
fn encode_quad_tree(coord: TileCoord) -> String {
    let mut digits = vec![b'0'; coord.z as usize];
    let (mut x, mut y) = (coord.x, coord.y);
    for i in (0..coord.z as usize).rev() {
        digits[i] = b'0' + ((x & 1) | ((y & 1) << 1)) as u8;
        x >>= 1;
        y >>= 1;
    }
    String::from_utf8(digits).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin_visits_each_mirror_in_order() {
        let provider = TileProvider::from_line(
            "OSM,osm,0,18,256,http://{$s}.example/{$z}/{$x}/{$y}.png,a,b,c",
        )
        .unwrap();
        let coord = TileCoord::new(5, 5, 5);

        let urls: Vec<String> = (0..3).map(|_| provider.url(coord)).collect();
        assert!(urls[0].starts_with("http://a.example/"));
        assert!(urls[1].starts_with("http://b.example/"));
        assert!(urls[2].starts_with("http://c.example/"));
        // Fourth call wraps around.
        assert!(provider.url(coord).starts_with("http://a.example/"));
    }

    #[test]
    fn test_osm_scenario_url() {
        let provider = TileProvider::from_line(
            "OSM,osm,0,18,256,http://{$s}.example/{$z}/{$x}/{$y}.png,a,b,,",
        )
        .unwrap();
        let url = provider.url(TileCoord::new(5, 5, 5));
        assert_eq!(url, "http://a.example/5/5/5.png");
    }

    #[test]
    fn test_inverse_y() {
        let provider =
            TileProvider::from_line("TMS,tms,0,18,256,http://x.example/{$z}/{$x}/{$y},,,,,yinverse")
                .unwrap();
        // zoom 3: y' = 8 - 1 - 2 = 5
        let url = provider.url(TileCoord::new(1, 2, 3));
        assert_eq!(url, "http://x.example/3/1/5");
    }

    #[test]
    fn test_quad_tree_worked_example() {
        // zoom 2, (x=2, y=3): first digit from bit 1 -> (1)|(1<<1) = 3,
        // second digit from bit 0 -> (0)|(1<<1) = 2, giving "32".
        assert_eq!(encode_quad_tree(TileCoord::new(2, 3, 2)), "32");
        // Bing documentation example: zoom 3, (3, 5) -> "213".
        assert_eq!(encode_quad_tree(TileCoord::new(3, 5, 3)), "213");
        assert_eq!(encode_quad_tree(TileCoord::new(0, 0, 0)), "");
    }

    #[test]
    fn test_signature_token() {
        let provider = TileProvider::from_line(
            "VE,ve,1,19,256,http://x.example/h{$q}?g={$g},,,,,,secret01",
        )
        .unwrap();
        // (3*5 + 6) & 7 = 5 -> first five characters of the secret.
        let url = provider.url(TileCoord::new(5, 6, 4));
        assert!(url.ends_with("?g=secre"), "unexpected url {url}");
    }

    #[test]
    fn test_signature_token_multibyte_secret() {
        let provider = TileProvider::from_line(
            "VE,ve,1,19,256,http://x.example/h{$q}?g={$g},,,,,,ñññññññ",
        )
        .unwrap();
        // (3*5 + 6) & 7 = 5 -> first five characters, not bytes.
        let url = provider.url(TileCoord::new(5, 6, 4));
        assert!(url.ends_with("?g=ñññññ"), "unexpected url {url}");
        // A token longer than the secret takes the whole secret:
        // (3*1 + 4) & 7 = 7 = char count.
        let url = provider.url(TileCoord::new(1, 4, 4));
        assert!(url.ends_with("?g=ñññññññ"), "unexpected url {url}");
    }

    #[test]
    fn test_locale_substitution() {
        let provider =
            TileProvider::from_line("L,l,0,10,256,http://x.example/{$l}/{$z}/{$x}/{$y}")
                .unwrap()
                .with_locale("de");
        assert_eq!(provider.url(TileCoord::new(0, 0, 0)), "http://x.example/de/0/0/0");
    }
}
