//! Built-in virtual modules
//!
//! Protected entries stand in for platform capabilities the preview must
//! never reach. Fallback entries only cover common utilities generated code
//! tends to import without defining.

/// Payment-trigger hook
pub const CHECKOUT_HOOK_PATH: &str = "/hooks/useSellsPayCheckout.ts";

/// Shared style utility (`cn`)
pub const STYLE_UTILS_PATH: &str = "/lib/utils.ts";

/// Toast hook fallback
pub const TOAST_HOOK_PATH: &str = "/hooks/use-toast.ts";

/// Price formatting fallback
pub const FORMAT_PATH: &str = "/lib/format.ts";

/// Cart state fallback
pub const CART_HOOK_PATH: &str = "/hooks/useCart.ts";

/// Paths every overlay must protect
pub const REQUIRED_PROTECTED_PATHS: &[&str] = &[CHECKOUT_HOOK_PATH, STYLE_UTILS_PATH];

pub(crate) const CHECKOUT_HOOK_MOCK: &str = r#"// Preview stand-in for the checkout hook. It never contacts a payment service.
import { useCallback, useState } from "react";

export interface CheckoutOptions {
  productId?: string;
  priceId?: string;
  quantity?: number;
}

export interface CheckoutResult {
  ok: boolean;
  preview: true;
  url: null;
}

export function useSellsPayCheckout() {
  const [isLoading, setIsLoading] = useState(false);

  const startCheckout = useCallback(
    async (options: CheckoutOptions = {}): Promise<CheckoutResult> => {
      setIsLoading(true);
      console.info("[preview] checkout is disabled in preview mode", options);
      setIsLoading(false);
      return { ok: false, preview: true, url: null };
    },
    []
  );

  return { startCheckout, isLoading, error: null as string | null };
}

export default useSellsPayCheckout;
"#;

pub(crate) const STYLE_UTILS_MOCK: &str = r#"export type ClassValue = string | number | null | undefined | false | ClassValue[];

function flatten(inputs: ClassValue[], out: string[]): string[] {
  for (const input of inputs) {
    if (Array.isArray(input)) {
      flatten(input, out);
    } else if (input || input === 0) {
      out.push(String(input));
    }
  }
  return out;
}

export function cn(...inputs: ClassValue[]): string {
  return flatten(inputs, []).join(" ");
}
"#;

pub(crate) const TOAST_HOOK_MOCK: &str = r#"export interface ToastOptions {
  title?: string;
  description?: string;
  variant?: "default" | "destructive";
}

export function toast(options: ToastOptions) {
  console.info("[preview] toast", options);
  return { id: "preview", dismiss: () => {} };
}

export function useToast() {
  return { toast, toasts: [] as ToastOptions[], dismiss: () => {} };
}
"#;

pub(crate) const FORMAT_MOCK: &str = r#"export function formatPrice(cents: number, currency = "USD"): string {
  return new Intl.NumberFormat(undefined, { style: "currency", currency }).format(cents / 100);
}
"#;

pub(crate) const CART_HOOK_MOCK: &str = r#"import { useState } from "react";

export interface CartItem {
  id: string;
  name: string;
  priceCents: number;
  quantity: number;
}

export function useCart() {
  const [items, setItems] = useState<CartItem[]>([]);
  const addItem = (item: CartItem) => setItems((prev) => [...prev, item]);
  const removeItem = (id: string) => setItems((prev) => prev.filter((i) => i.id !== id));
  const clear = () => setItems([]);
  const totalCents = items.reduce((sum, i) => sum + i.priceCents * i.quantity, 0);
  return { items, addItem, removeItem, clear, totalCents };
}
"#;
