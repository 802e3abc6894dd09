// III-IV
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! HTML pages served by the application.
//!
//! Every value that comes from the database or from the user goes through `escape` before it
//! lands in a page.

use crate::model::{Listing, ListingDetails, Review};
use wanderlust_core::template::{apply, escape};

/// Boilerplate shared by all pages.
const LAYOUT: &str = include_str!("views/layout.html");

/// Page listing all listings.
const INDEX: &str = include_str!("views/index.html");

/// Summary of one listing within `INDEX`.
const LISTING_CARD: &str = include_str!("views/listing_card.html");

/// Form to create a listing.
const NEW: &str = include_str!("views/new.html");

/// Form to edit a listing.
const EDIT: &str = include_str!("views/edit.html");

/// Page with the details of a listing.
const SHOW: &str = include_str!("views/show.html");

/// One review within `SHOW`.
const REVIEW: &str = include_str!("views/review.html");

/// Page describing why a submitted listing was rejected.
const VALIDATION_ERROR: &str = include_str!("views/validation_error.html");

/// Wraps `content` in the common layout of a page named `title`.
fn page(title: &str, content: &str) -> String {
    apply(LAYOUT, &[("title", &escape(title)), ("content", content)])
}

/// Renders the page with all `listings`.
pub(crate) fn index(listings: &[Listing]) -> String {
    let cards = if listings.is_empty() {
        "<p class=\"empty\">No listings yet.</p>".to_owned()
    } else {
        listings
            .iter()
            .map(|listing| {
                let fields = listing.fields();
                apply(
                    LISTING_CARD,
                    &[
                        ("id", &listing.id().to_string()),
                        ("image", &escape(fields.image())),
                        ("title", &escape(fields.title())),
                        ("price", &fields.price().to_string()),
                    ],
                )
            })
            .collect::<Vec<String>>()
            .join("\n")
    };
    page("All listings", &apply(INDEX, &[("cards", &cards)]))
}

/// Renders the form to create a listing.
pub(crate) fn new_listing() -> String {
    page("New listing", NEW)
}

/// Renders the form to edit `listing`.
pub(crate) fn edit(listing: &Listing) -> String {
    let fields = listing.fields();
    let content = apply(
        EDIT,
        &[
            ("id", &listing.id().to_string()),
            ("title", &escape(fields.title())),
            ("description", &escape(fields.description())),
            ("image", &escape(fields.image())),
            ("price", &fields.price().to_string()),
            ("country", &escape(fields.country())),
            ("location", &escape(fields.location())),
        ],
    );
    page(&format!("Edit {}", fields.title()), &content)
}

/// Renders one `review` of the listing in `details`.
fn review(details: &ListingDetails, review: &Review) -> String {
    apply(
        REVIEW,
        &[
            ("rating", &review.rating().to_string()),
            ("comment", &escape(review.comment())),
            ("date", &review.created_at().date().to_string()),
            ("listing_id", &details.listing().id().to_string()),
            ("review_id", &review.id().to_string()),
        ],
    )
}

/// Renders the page with the `details` of a listing.
pub(crate) fn show(details: &ListingDetails) -> String {
    let listing = details.listing();
    let fields = listing.fields();

    let reviews = if details.reviews().is_empty() {
        "<p class=\"empty\">No reviews yet.</p>".to_owned()
    } else {
        details.reviews().iter().map(|r| review(details, r)).collect::<Vec<String>>().join("\n")
    };

    let content = apply(
        SHOW,
        &[
            ("id", &listing.id().to_string()),
            ("title", &escape(fields.title())),
            ("image", &escape(fields.image())),
            ("description", &escape(fields.description())),
            ("price", &fields.price().to_string()),
            ("location", &escape(fields.location())),
            ("country", &escape(fields.country())),
            ("reviews", &reviews),
        ],
    );
    page(fields.title(), &content)
}

/// Renders the page that explains why a listing was rejected.
pub(crate) fn validation_error(message: Option<&str>) -> String {
    let message = message.unwrap_or("The submitted listing is not valid");
    page("Invalid listing", &apply(VALIDATION_ERROR, &[("message", &escape(message))]))
}
