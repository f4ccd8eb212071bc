// SPDX-License-Identifier: Apache-2.0

use criterion::{criterion_group, criterion_main, Criterion};
use tradepost_model::{Currency, EmailAddress, OrderDraft, OrderDraftLine, OrderId, Product, ProductSlug};
use tradepost_store::Store;

fn seeded_store() -> Store {
    let store = Store::open_in_memory(1).expect("open store");
    for i in 0..20 {
        store
            .upsert_product(&Product {
                slug: ProductSlug::parse(&format!("item-{i}")).expect("slug"),
                name: format!("Item {i}"),
                description: "bench fixture".to_string(),
                price_cents: 500 + i * 100,
                currency: Currency::Usd,
                image_url: None,
                active: true,
                position: i,
                created_at_ms: 1,
                updated_at_ms: 1,
            })
            .expect("seed product");
    }
    store
}

fn bench_create_order(c: &mut Criterion) {
    let store = seeded_store();
    let email = EmailAddress::parse("bench@example.com").expect("email");
    let mut nonce = 0_u64;
    c.bench_function("store_create_order_three_lines", |b| {
        b.iter(|| {
            nonce += 1;
            let draft = OrderDraft {
                email: email.clone(),
                lines: vec![
                    OrderDraftLine {
                        slug: ProductSlug::parse("item-0").expect("slug"),
                        quantity: 2,
                    },
                    OrderDraftLine {
                        slug: ProductSlug::parse("item-7").expect("slug"),
                        quantity: 1,
                    },
                    OrderDraftLine {
                        slug: ProductSlug::parse("item-13").expect("slug"),
                        quantity: 3,
                    },
                ],
                idempotency_key: None,
            };
            store
                .create_order(&draft, &OrderId::mint(nonce), nonce)
                .expect("create order")
        });
    });
}

criterion_group!(benches, bench_create_order);
criterion_main!(benches);
