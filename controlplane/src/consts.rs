// Finalizer guarding teardown of the ingress-nginx stack owned by a SandOpsIngress.
pub const INGRESS_FINALIZER: &str = "k8s.io/ingress-finalizer";

// Finalizer guarding teardown of the workload and service owned by a FrontendDeploy.
pub const FRONTEND_FINALIZER: &str = "frontends.sandtech.io/finalizer";

// Selector label shared by every object of the FrontendDeploy family.
pub const APP_LABEL: &str = "app";

// Node selector label used to pin a frontend to a single node.
pub const HOSTNAME_LABEL: &str = "kubernetes.io/hostname";

// Namespace of the owning custom resource, stamped on every dependent object. Lets watches on
// objects outside that namespace find their owner again.
pub const OWNER_NAMESPACE_LABEL: &str = "sandtech.io/owner-namespace";

pub const COMPONENT_LABEL: &str = "app.kubernetes.io/component";
pub const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";
pub const NAME_LABEL: &str = "app.kubernetes.io/name";
pub const PART_OF_LABEL: &str = "app.kubernetes.io/part-of";
pub const VERSION_LABEL: &str = "app.kubernetes.io/version";

// Version label value of the rendered ingress-nginx manifests.
pub const INGRESS_NGINX_VERSION: &str = "1.11.2";

pub const INGRESS_NGINX: &str = "ingress-nginx";
pub const INGRESS_NGINX_ADMISSION: &str = "ingress-nginx-admission";
pub const INGRESS_NGINX_CONTROLLER: &str = "ingress-nginx-controller";
pub const INGRESS_NGINX_CONTROLLER_ADMISSION: &str = "ingress-nginx-controller-admission";
pub const ADMISSION_CREATE_JOB: &str = "ingress-nginx-admission-create";
pub const ADMISSION_PATCH_JOB: &str = "ingress-nginx-admission-patch";

// Component label values.
pub const CONTROLLER: &str = "controller";
pub const ADMISSION_WEBHOOK: &str = "admission-webhook";

pub const CONTROLLER_IMAGE: &str = "registry.k8s.io/ingress-nginx/controller:v1.8.1@sha256:e5c4824e7375fcf2a393e1c03c293b69759af37a9ca6abdb91b13d78a93da8bd";
pub const CERTGEN_IMAGE: &str = "registry.k8s.io/ingress-nginx/kube-webhook-certgen:v1.4.3@sha256:a320a50cc91bd15fd2d6fa6de58bd98c1bd64b9a6f926ce23a600d87043455a3";

// Health endpoint exposed by the ingress-nginx controller.
pub const HEALTHZ_PATH: &str = "/healthz";
pub const HEALTHZ_PORT: i32 = 10254;

pub const TERMINATION_GRACE_PERIOD_SECONDS: i64 = 300;

// Container name of the single workload container of a frontend.
pub const FRONTEND_CONTAINER: &str = "container-1";
pub const FRONTEND_CPU_REQUEST: &str = "500m";
pub const FRONTEND_CPU_LIMIT: &str = "2";

// Routing object annotations.
pub const USE_REGEX_ANNOTATION: &str = "nginx.ingress.kubernetes.io/use-regex";
pub const REWRITE_TARGET_ANNOTATION: &str = "nginx.ingress.kubernetes.io/rewrite-target";
pub const PROXY_BODY_SIZE_ANNOTATION: &str = "nginx.ingress.kubernetes.io/proxy-body-size";
pub const REWRITE_TARGET: &str = "/$1";
pub const PROXY_BODY_SIZE: &str = "8m";

// Path type required for regex path patterns.
pub const ROUTE_PATH_TYPE: &str = "ImplementationSpecific";

// Catch-all pattern owned by the host frontend.
pub const HOST_ROUTE_PATTERN: &str = "/?(.*)";

pub const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";
