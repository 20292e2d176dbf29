use crate::models::Listing;
use chrono::Local;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

pub const SITE_ORIGIN: &str = "https://sh.lianjia.com";

/// One listing pulled out of a results page. A record that hit trouble
/// mid-extraction is kept with whatever fields were already set, and the
/// trouble is carried alongside instead of only being logged.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub listing: Listing,
    pub error: Option<String>,
}

impl Extraction {
    pub fn is_partial(&self) -> bool {
        self.error.is_some()
    }
}

fn element_text(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Extracts every listing item on the page, in document order.
pub fn extract_listings(document: &Html) -> Vec<Extraction> {
    let item_selector = Selector::parse("div.content__list--item").unwrap();
    document.select(&item_selector).map(extract_listing).collect()
}

pub fn extract_listing(item: ElementRef) -> Extraction {
    let mut listing = Listing::default();
    let mut errors: Vec<String> = Vec::new();

    let aside_selector = Selector::parse("a.content__list--item--aside").unwrap();
    if let Some(aside) = item.select(&aside_selector).next() {
        listing.title = aside.value().attr("title").unwrap_or("").trim().to_string();
        if let Some(href) = aside.value().attr("href") {
            listing.link = format!("{}{}", SITE_ORIGIN, href.trim());
        }
    }

    let price_selector = Selector::parse("span.content__list--item-price").unwrap();
    if let Some(price_el) = item.select(&price_selector).next() {
        let label = element_text(price_el);
        match split_price(&label) {
            Some((price, unit)) => {
                listing.price = Some(price);
                listing.price_unit = Some(unit);
            }
            None => errors.push(format!("unparseable price label: {}", label)),
        }
    }

    let des_selector = Selector::parse("p.content__list--item--des").unwrap();
    if let Some(des) = item.select(&des_selector).next() {
        fill_location(&mut listing, des);
        for token in feature_tokens(des) {
            classify_token(&mut listing, &token, &mut errors);
        }
    }

    let bottom_selector = Selector::parse("p.content__list--item--bottom").unwrap();
    if let Some(bottom) = item.select(&bottom_selector).next() {
        let badge_selector = Selector::parse("i").unwrap();
        let tags: Vec<String> = bottom.select(&badge_selector).map(element_text).collect();
        listing.verified = tags.iter().any(|t| t == "官方核验");
        listing.near_subway = tags.iter().any(|t| t == "近地铁");
        listing.furnished = tags.iter().any(|t| t == "精装");
        listing.tags = Some(tags.join("|"));
    }

    let brand_selector = Selector::parse("p.content__list--item--brand").unwrap();
    if let Some(brand) = item.select(&brand_selector).next() {
        let agency_selector = Selector::parse("span.brand").unwrap();
        listing.agency = Some(
            brand
                .select(&agency_selector)
                .next()
                .map(element_text)
                .unwrap_or_default(),
        );
        let time_selector = Selector::parse("span.content__list--item--time").unwrap();
        listing.maintained_at = Some(
            brand
                .select(&time_selector)
                .next()
                .map(element_text)
                .unwrap_or_default(),
        );
    }

    let must_see_selector = Selector::parse(r#"img[alt="必看好房"]"#).unwrap();
    listing.must_see = item.select(&must_see_selector).next().is_some();
    let vr_selector = Selector::parse("i.vr-logo").unwrap();
    listing.vr_tour = item.select(&vr_selector).next().is_some();

    listing.captured_at = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

    Extraction {
        listing,
        error: if errors.is_empty() {
            None
        } else {
            Some(errors.join("; "))
        },
    }
}

/// Splits a price label like `3000元/月` into the integer amount and the
/// unit text that remains after removing the digits.
fn split_price(label: &str) -> Option<(u32, String)> {
    let digits: String = label.chars().filter(|c| c.is_ascii_digit()).collect();
    let price: u32 = digits.parse().ok()?;
    let unit = label
        .replacen(&price.to_string(), "", 1)
        .trim()
        .to_string();
    Some((price, unit))
}

/// The first three links of the description block map positionally to
/// district, subdistrict and community; any further links are ignored.
fn fill_location(listing: &mut Listing, des: ElementRef) {
    let link_selector = Selector::parse("a").unwrap();
    let links: Vec<ElementRef> = des.select(&link_selector).collect();

    if let Some(first) = links.first() {
        listing.district = element_text(*first);
    }
    if links.len() >= 2 {
        listing.subdistrict = element_text(links[1]);
    }
    if links.len() >= 3 {
        listing.community = element_text(links[2]);
        if let Some(href) = links[2].value().attr("href") {
            listing.community_link = format!("{}{}", SITE_ORIGIN, href);
        }
    }
}

/// Whitespace-stripped text tokens of the description block, minus the bare
/// `-` and `/` separators the markup uses between fields.
fn feature_tokens(des: ElementRef) -> Vec<String> {
    des.text()
        .map(str::trim)
        .filter(|t| !t.is_empty() && *t != "-" && *t != "/")
        .map(str::to_string)
        .collect()
}

/// Classifies one free-text token by content, first match wins, and fills
/// the corresponding field if it is still unset. Tokens matching nothing
/// are dropped.
fn classify_token(listing: &mut Listing, token: &str, errors: &mut Vec<String>) {
    if token.contains('㎡') {
        if listing.area_sqm.is_none() {
            let re = Regex::new(r"(\d+\.?\d*)").unwrap();
            match re
                .captures(token)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<f64>().ok())
            {
                Some(area) => listing.area_sqm = Some(area),
                None => errors.push(format!("unparseable area token: {}", token)),
            }
        }
    } else if token.chars().any(|c| matches!(c, '东' | '南' | '西' | '北')) {
        if listing.orientation.is_none() {
            listing.orientation = Some(token.to_string());
        }
    } else if token.chars().any(|c| matches!(c, '室' | '厅' | '卫')) {
        if listing.layout.is_none() {
            listing.layout = Some(token.to_string());
        }
    } else if token.contains('层') {
        if listing.floor.is_none() {
            listing.floor = Some(token.to_string());
        }
        if listing.total_floors.is_none() && token.contains('（') && token.contains('）') {
            let re = Regex::new(r"(\d+)层").unwrap();
            listing.total_floors = re
                .captures_iter(token)
                .last()
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse().ok());
        }
    } else if token.contains("年建") {
        if listing.built_year.is_none() {
            let re = Regex::new(r"(\d+)").unwrap();
            listing.built_year = re
                .captures(token)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse().ok());
        }
    }
}

/// Total-page count advertised by the pagination marker, when present.
pub fn total_page_marker(document: &Html) -> Option<usize> {
    let pg_selector = Selector::parse("div.content__pg").unwrap();
    document
        .select(&pg_selector)
        .next()
        .and_then(|el| el.value().attr("data-totalpage"))
        .and_then(|v| v.trim().parse().ok())
}

/// Whether a usable "next page" control exists (present and not disabled).
pub fn next_control_active(document: &Html) -> bool {
    let next_selector = Selector::parse("a.content__pg--next").unwrap();
    document
        .select(&next_selector)
        .next()
        .map(|el| !el.value().classes().any(|c| c == "disabled"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing_item(price_label: &str, des_body: &str) -> String {
        format!(
            r#"<div class="content__list--item">
                <a class="content__list--item--aside" href="/zufang/SH100001.html" title="整租·慧芝湖花园 2室1厅 南"></a>
                <span class="content__list--item-price"><em>{}</em></span>
                <p class="content__list--item--des">{}</p>
            </div>"#,
            price_label, des_body
        )
    }

    fn first_extraction(html: &str) -> Extraction {
        let document = Html::parse_document(html);
        extract_listings(&document).into_iter().next().unwrap()
    }

    #[test]
    fn title_and_link_come_from_the_aside_anchor() {
        let extraction = first_extraction(&listing_item("3000元/月", ""));
        assert_eq!(extraction.listing.title, "整租·慧芝湖花园 2室1厅 南");
        assert_eq!(
            extraction.listing.link,
            "https://sh.lianjia.com/zufang/SH100001.html"
        );
    }

    #[test]
    fn missing_anchor_yields_empty_strings() {
        let html = r#"<div class="content__list--item"></div>"#;
        let extraction = first_extraction(html);
        assert_eq!(extraction.listing.title, "");
        assert_eq!(extraction.listing.link, "");
        assert!(!extraction.is_partial());
    }

    #[test]
    fn price_splits_into_amount_and_unit() {
        let extraction = first_extraction(&listing_item("3000元/月", ""));
        assert_eq!(extraction.listing.price, Some(3000));
        assert_eq!(extraction.listing.price_unit.as_deref(), Some("元/月"));
    }

    #[test]
    fn price_split_survives_nested_markup() {
        // The amount sits in its own element; text nodes concatenate.
        let html = r#"<div class="content__list--item">
            <span class="content__list--item-price"><em>4500</em> 元/月</span>
        </div>"#;
        let extraction = first_extraction(html);
        assert_eq!(extraction.listing.price, Some(4500));
        assert_eq!(extraction.listing.price_unit.as_deref(), Some("元/月"));
    }

    #[test]
    fn digitless_price_label_marks_the_record_partial() {
        let extraction = first_extraction(&listing_item("面议", ""));
        assert_eq!(extraction.listing.price, None);
        assert!(extraction.is_partial());
        // The rest of the record is still filled.
        assert_eq!(extraction.listing.title, "整租·慧芝湖花园 2室1厅 南");
    }

    #[test]
    fn location_links_fill_positionally() {
        let des = r#"<a href="/zufang/jingan/">静安</a>-<a href="/zufang/daning/">大宁</a>-<a href="/zufang/c5011000018046/">慧芝湖花园</a>"#;
        let listing = first_extraction(&listing_item("3000元/月", des)).listing;
        assert_eq!(listing.district, "静安");
        assert_eq!(listing.subdistrict, "大宁");
        assert_eq!(listing.community, "慧芝湖花园");
        assert_eq!(
            listing.community_link,
            "https://sh.lianjia.com/zufang/c5011000018046/"
        );
    }

    #[test]
    fn fewer_location_links_leave_the_rest_empty() {
        for (des, filled) in [
            ("", 0usize),
            (r#"<a href="/zufang/jingan/">静安</a>"#, 1),
            (
                r#"<a href="/zufang/jingan/">静安</a>-<a href="/zufang/daning/">大宁</a>"#,
                2,
            ),
        ] {
            let listing = first_extraction(&listing_item("3000元/月", des)).listing;
            let fields = [
                listing.district.clone(),
                listing.subdistrict.clone(),
                listing.community.clone(),
                listing.community_link.clone(),
            ];
            assert_eq!(
                fields.iter().filter(|f| !f.is_empty()).count(),
                filled,
                "des: {}",
                des
            );
        }
    }

    #[test]
    fn fourth_and_later_links_are_ignored() {
        let des = r#"<a href="/a/">静安</a><a href="/b/">大宁</a><a href="/c/">慧芝湖花园</a><a href="/d/">多余</a>"#;
        let listing = first_extraction(&listing_item("3000元/月", des)).listing;
        assert_eq!(listing.community, "慧芝湖花园");
        assert_eq!(listing.community_link, "https://sh.lianjia.com/c/");
    }

    #[test]
    fn feature_tokens_classify_by_content() {
        let des = r#"<a href="/zufang/jingan/">静安</a><i>/</i>38.5㎡<i>/</i>南<i>/</i>2室1厅1卫<i>/</i>中楼层（12层）<i>/</i>2010年建"#;
        let listing = first_extraction(&listing_item("3000元/月", des)).listing;
        assert_eq!(listing.area_sqm, Some(38.5));
        assert_eq!(listing.orientation.as_deref(), Some("南"));
        assert_eq!(listing.layout.as_deref(), Some("2室1厅1卫"));
        assert_eq!(listing.floor.as_deref(), Some("中楼层（12层）"));
        assert_eq!(listing.total_floors, Some(12));
        assert_eq!(listing.built_year, Some(2010));
    }

    #[test]
    fn floor_without_parenthesized_total_leaves_total_unset() {
        let des = "高楼层<i>/</i>南";
        let listing = first_extraction(&listing_item("3000元/月", des)).listing;
        assert_eq!(listing.floor.as_deref(), Some("高楼层"));
        assert_eq!(listing.total_floors, None);
    }

    #[test]
    fn unmatched_tokens_are_dropped_silently() {
        let des = "随时看房<i>/</i>2室1厅1卫";
        let extraction = first_extraction(&listing_item("3000元/月", des));
        assert_eq!(extraction.listing.layout.as_deref(), Some("2室1厅1卫"));
        assert!(!extraction.is_partial());
    }

    #[test]
    fn classification_fills_each_field_at_most_once() {
        // Two orientation-looking tokens: the first wins, the second never
        // overwrites it.
        let des = "南<i>/</i>东南";
        let listing = first_extraction(&listing_item("3000元/月", des)).listing;
        assert_eq!(listing.orientation.as_deref(), Some("南"));
    }

    #[test]
    fn tag_badges_join_and_hoist_flags() {
        let html = r#"<div class="content__list--item">
            <p class="content__list--item--bottom">
                <i>官方核验</i><i>近地铁</i><i>精装</i><i>随时看房</i>
            </p>
        </div>"#;
        let listing = first_extraction(html).listing;
        assert_eq!(
            listing.tags.as_deref(),
            Some("官方核验|近地铁|精装|随时看房")
        );
        assert!(listing.verified);
        assert!(listing.near_subway);
        assert!(listing.furnished);
    }

    #[test]
    fn absent_brand_subelements_yield_empty_strings() {
        let html = r#"<div class="content__list--item">
            <p class="content__list--item--brand"><span class="brand">链家</span></p>
        </div>"#;
        let listing = first_extraction(html).listing;
        assert_eq!(listing.agency.as_deref(), Some("链家"));
        assert_eq!(listing.maintained_at.as_deref(), Some(""));
    }

    #[test]
    fn marker_elements_set_boolean_flags() {
        let html = r#"<div class="content__list--item">
            <img alt="必看好房" src="/img/musthave.png">
            <i class="vr-logo"></i>
        </div>"#;
        let listing = first_extraction(html).listing;
        assert!(listing.must_see);
        assert!(listing.vr_tour);
    }

    #[test]
    fn capture_timestamp_has_the_expected_shape() {
        let listing = first_extraction(&listing_item("3000元/月", "")).listing;
        assert_eq!(listing.captured_at.len(), 19);
        assert_eq!(&listing.captured_at[4..5], "-");
        assert_eq!(&listing.captured_at[13..14], ":");
    }

    #[test]
    fn total_page_marker_reads_the_pagination_attribute() {
        let document =
            Html::parse_document(r#"<div class="content__pg" data-totalpage="7"></div>"#);
        assert_eq!(total_page_marker(&document), Some(7));

        let document = Html::parse_document(r#"<div class="content__pg"></div>"#);
        assert_eq!(total_page_marker(&document), None);
    }

    #[test]
    fn next_control_state() {
        let active =
            Html::parse_document(r##"<a class="content__pg--next" href="#">下一页</a>"##);
        assert!(next_control_active(&active));

        let disabled = Html::parse_document(
            r##"<a class="content__pg--next disabled" href="#">下一页</a>"##,
        );
        assert!(!next_control_active(&disabled));

        let missing = Html::parse_document("<p>no pagination</p>");
        assert!(!next_control_active(&missing));
    }
}
