// Shapefile .prj sidecars hold a WKT string. The EPSG code comes from the
// root authority when there is one (last AUTHORITY in WKT1, trailing ID in
// WKT2). ESRI-flavoured WKT carries no authority, so the root CRS name is
// matched against the WGS 84 geographic and UTM names instead.

const WGS84: u16 = 4326;
const UTM_NORTH: u16 = 32600;
const UTM_SOUTH: u16 = 32700;

pub fn epsg_from_wkt(wkt: &str) -> Option<u16> {
    let compact: String = wkt.chars().filter(|c| !c.is_whitespace()).collect();
    let upper = compact.to_ascii_uppercase();
    root_authority(&upper).or_else(|| epsg_from_crs_name(&root_name(wkt)?))
}

fn root_authority(upper: &str) -> Option<u16> {
    let mut depth = 0_usize;
    let mut quoted = false;
    for (i, c) in upper.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '[' if !quoted => depth += 1,
            ']' if !quoted => depth = depth.saturating_sub(1),
            _ if !quoted && depth == 1 && upper[..i].ends_with(',') => {
                let rest = ["AUTHORITY[\"EPSG\",", "ID[\"EPSG\","]
                    .iter()
                    .find_map(|marker| upper[i..].strip_prefix(marker));
                if let Some(rest) = rest {
                    let digits: String = rest
                        .trim_start_matches('"')
                        .chars()
                        .take_while(|c| c.is_ascii_digit())
                        .collect();
                    return digits.parse().ok();
                }
            }
            _ => {}
        }
    }
    None
}

/// Name of the outermost CRS element, e.g. `WGS_1984_UTM_Zone_43N`.
fn root_name(wkt: &str) -> Option<String> {
    let open = wkt.find('[')?;
    let rest = wkt[open + 1..].trim_start().strip_prefix('"')?;
    let name = &rest[..rest.find('"')?];
    Some(name.to_string())
}

/// Recognises WGS 84 and WGS 84 / UTM names in their ESRI and OGC spellings.
fn epsg_from_crs_name(name: &str) -> Option<u16> {
    let normalized: String = name
        .to_ascii_uppercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let tokens: Vec<&str> = normalized.split('_').filter(|t| !t.is_empty()).collect();

    let datum_len = match tokens.as_slice() {
        ["GCS", "WGS", "1984", ..] => 3,
        ["WGS", "1984", ..] | ["WGS", "84", ..] => 2,
        _ => return None,
    };
    match &tokens[datum_len..] {
        [] => Some(WGS84),
        ["UTM", "ZONE", zone] => {
            let (number, hemisphere) = zone.split_at(zone.len().checked_sub(1)?);
            let number: u16 = number.parse().ok().filter(|n| (1..=60).contains(n))?;
            match hemisphere {
                "N" => Some(UTM_NORTH + number),
                "S" => Some(UTM_SOUTH + number),
                _ => None,
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_the_root_authority_of_wkt1() {
        let wkt = r#"PROJCS["WGS 84 / UTM zone 43N",GEOGCS["WGS 84",DATUM["WGS_1984",
            SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],
            AUTHORITY["EPSG","6326"]],AUTHORITY["EPSG","4326"]],
            PROJECTION["Transverse_Mercator"],UNIT["metre",1,AUTHORITY["EPSG","9001"]],
            AUTHORITY["EPSG","32643"]]"#;
        assert_eq!(epsg_from_wkt(wkt), Some(32643));
    }

    #[test]
    fn reads_wkt2_identifiers() {
        let wkt = r#"GEOGCRS["WGS 84",DATUM["World Geodetic System 1984"],ID["EPSG",4326]]"#;
        assert_eq!(epsg_from_wkt(wkt), Some(4326));
    }

    #[test]
    fn esri_utm_names_map_to_epsg() {
        let wkt = r#"PROJCS["WGS_1984_UTM_Zone_43N",GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",
            SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],
            UNIT["Degree",0.0174532925199433]],PROJECTION["Transverse_Mercator"],
            PARAMETER["False_Easting",500000.0],PARAMETER["False_Northing",0.0],
            PARAMETER["Central_Meridian",75.0],PARAMETER["Scale_Factor",0.9996],
            PARAMETER["Latitude_Of_Origin",0.0],UNIT["Meter",1.0]]"#;
        assert_eq!(epsg_from_wkt(wkt), Some(32643));
    }

    #[test]
    fn esri_geographic_wgs84() {
        let wkt = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;
        assert_eq!(epsg_from_wkt(wkt), Some(4326));
    }

    #[test]
    fn inner_authorities_are_not_the_root() {
        // Only the unit carries an authority; the root name decides
        let wkt = r#"PROJCS["WGS 84 / UTM zone 7S",GEOGCS["WGS 84"],UNIT["metre",1,AUTHORITY["EPSG","9001"]]]"#;
        assert_eq!(epsg_from_wkt(wkt), Some(32707));
    }

    #[test]
    fn unknown_names_yield_nothing() {
        assert_eq!(epsg_from_crs_name("Kalianpur_1975_UTM_Zone_43N"), None);
        assert_eq!(epsg_from_crs_name("WGS_1984_UTM_Zone_61N"), None);
        assert_eq!(epsg_from_wkt(r#"LOCAL_CS["site grid"]"#), None);
    }
}
